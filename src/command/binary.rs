//! Binary payloads and the nested response envelope.
//!
//! Inbound responses wrap their serialized body in a second length layer:
//! ```text
//! ┌──────────┬───────────┬───────────┬──────────────┐
//! │ Command  │ Frame len │ Inner len │ Inner bytes  │
//! │ 2 bytes  │ 4 bytes   │ 4 bytes   │ Inner len    │
//! │ uint16 BE│ uint32 BE │ uint32 BE │              │
//! └──────────┴───────────┴───────────┴──────────────┘
//! ```
//!
//! The frame length covers the inner length field and the inner bytes.
//! Both lengths are checked against the buffer before anything is sliced.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;

use super::BinaryCommand;
use crate::codec::MsgPackCodec;
use crate::error::{NetError, Result};

/// Command code + frame length + inner length.
pub const ENVELOPE_HEADER_SIZE: usize = 10;

/// Raw binary payload with an authoritative length.
///
/// The backing buffer may be longer than `len` when it comes from a reused
/// pool; only the first `len` bytes are meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryPayload {
    buf: Bytes,
    len: usize,
}

impl BinaryPayload {
    /// Wrap a buffer whose full length is meaningful.
    pub fn new(buf: Bytes) -> Self {
        let len = buf.len();
        Self { buf, len }
    }

    /// Wrap a buffer of which only the first `len` bytes are meaningful.
    pub fn with_len(buf: Bytes, len: usize) -> Result<Self> {
        if len > buf.len() {
            return Err(NetError::Protocol(format!(
                "Declared length {} exceeds buffer of {} bytes",
                len,
                buf.len()
            )));
        }
        Ok(Self { buf, len })
    }

    /// Copy a slice into a new payload.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// The meaningful bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The meaningful bytes as a cheap `Bytes` clone.
    pub fn to_bytes(&self) -> Bytes {
        self.buf.slice(..self.len)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// A parsed inbound response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryEnvelope {
    /// Command code from the first two bytes.
    pub command: BinaryCommand,
    /// Declared frame length.
    pub frame_len: u32,
    /// Serialized inner payload (zero-copy slice of the frame).
    pub inner: Bytes,
}

impl BinaryEnvelope {
    /// Parse and validate an envelope.
    ///
    /// # Errors
    ///
    /// [`NetError::InvalidEnvelope`] when the buffer is shorter than the
    /// header or either length field points past the end of the buffer.
    pub fn parse(payload: &BinaryPayload) -> Result<Self> {
        let bytes = payload.to_bytes();
        if bytes.len() < ENVELOPE_HEADER_SIZE {
            return Err(NetError::InvalidEnvelope(format!(
                "{} bytes is shorter than the {}-byte header",
                bytes.len(),
                ENVELOPE_HEADER_SIZE
            )));
        }

        let command = BinaryCommand(u16::from_be_bytes([bytes[0], bytes[1]]));
        let frame_len = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let inner_len = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);

        let after_frame_len = bytes.len() - 6;
        if frame_len as usize > after_frame_len {
            return Err(NetError::InvalidEnvelope(format!(
                "frame length {} exceeds the {} bytes available",
                frame_len, after_frame_len
            )));
        }
        if (frame_len as usize) < 4 || inner_len as usize > frame_len as usize - 4 {
            return Err(NetError::InvalidEnvelope(format!(
                "inner length {} does not fit in frame length {}",
                inner_len, frame_len
            )));
        }

        let start = ENVELOPE_HEADER_SIZE;
        let inner = bytes.slice(start..start + inner_len as usize);

        Ok(Self {
            command,
            frame_len,
            inner,
        })
    }

    /// Decode the inner payload with the MsgPack codec.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.inner)
    }
}

/// Build an envelope around `inner` (used by tests and local loopback tools).
pub fn build_envelope(command: BinaryCommand, inner: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + inner.len());
    buf.put_u16(command.code());
    buf.put_u32(inner.len() as u32 + 4);
    buf.put_u32(inner.len() as u32);
    buf.put_slice(inner);
    buf.freeze()
}
