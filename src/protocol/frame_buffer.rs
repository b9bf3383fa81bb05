//! Incremental decoder for `[len][kind][payload]` frames.
//!
//! Socket reads are appended to one `BytesMut`; complete bodies are split
//! off and frozen, so payloads share the read allocation. Two states:
//! - `WaitingForLength`: fewer than 4 prefix bytes buffered
//! - `WaitingForBody`: prefix accepted, `remaining` body bytes still due
//!
//! Length violations are returned as errors and leave the buffer unusable;
//! the caller must drop the connection. Frames with an unknown kind byte are
//! skipped with a warning.

use bytes::BytesMut;

use super::wire_format::{
    decode_body, decode_length, validate_length, LENGTH_PREFIX_SIZE, MAX_MESSAGE_SIZE,
};
use super::Frame;
use crate::error::{NetError, Result};

/// Decoder position within the current frame.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the length prefix.
    WaitingForLength,
    /// Prefix parsed, waiting for `remaining` body bytes (kind + payload).
    WaitingForBody { remaining: u32 },
}

/// Reassembles frames from arbitrarily split reads of one connection.
pub struct FrameBuffer {
    /// Bytes read but not yet consumed by a frame.
    buffer: BytesMut,
    state: State,
    /// Maximum allowed value of the length prefix.
    max_length: u32,
    /// Frames dropped because of an unknown kind byte.
    dropped: u64,
}

impl FrameBuffer {
    /// 64 KiB initial capacity, 1 MiB frame limit.
    pub fn new() -> Self {
        Self::with_capacity_and_max_length(64 * 1024, MAX_MESSAGE_SIZE)
    }

    pub fn with_max_length(max_length: u32) -> Self {
        Self::with_capacity_and_max_length(64 * 1024, max_length)
    }

    pub fn with_capacity_and_max_length(capacity: usize, max_length: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForLength,
            max_length,
            dropped: 0,
        }
    }

    /// Append one read and return every frame it completes, in order.
    ///
    /// Partial data is kept for the next push, so chunk boundaries
    /// do not affect the decoded sequence.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a length prefix is 0 or exceeds the
    /// configured maximum. The stream cannot be resynchronised after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        self.push_into(data, &mut frames)?;
        Ok(frames)
    }

    /// Like [`push`](Self::push), but appends to `out`.
    ///
    /// Frames completed before a length violation are already in `out` when
    /// the error is returned, so a reader can deliver them before closing.
    /// The result does not depend on how the stream was split into reads.
    pub fn push_into(&mut self, data: &[u8], out: &mut Vec<Frame>) -> Result<()> {
        self.buffer.extend_from_slice(data);
        while let Some(frame) = self.try_extract_one()? {
            out.push(frame);
        }
        Ok(())
    }

    /// `Ok(None)` means more bytes are needed. Unknown-kind frames are
    /// consumed and skipped inside the loop.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }

                    let prefix = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                    let length = decode_length([prefix[0], prefix[1], prefix[2], prefix[3]]);
                    validate_length(length, self.max_length)?;

                    self.state = State::WaitingForBody { remaining: length };
                }

                State::WaitingForBody { remaining } => {
                    let remaining = remaining as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForLength;

                    match decode_body(&body) {
                        Ok((kind, payload)) => return Ok(Some(Frame::new(kind, payload))),
                        Err(NetError::UnknownKind(kind)) => {
                            self.dropped += 1;
                            tracing::warn!(
                                "Dropping frame with unknown kind {:#04x} ({} bytes)",
                                kind,
                                remaining
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    /// Bytes buffered towards the next frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True when a frame has been started but not completed.
    ///
    /// Used to tell an orderly close apart from a truncated frame.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForBody { .. })
    }

    /// Number of frames skipped because of an unknown kind byte.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Forget buffered bytes; the next push starts at a length prefix.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
