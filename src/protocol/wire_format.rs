//! Wire format encoding and decoding.
//!
//! Every frame on the connection has the layout:
//! ```text
//! ┌──────────┬───────┬─────────────────┐
//! │ Length   │ Kind  │ Payload         │
//! │ 4 bytes  │ 1 byte│ Length - 1 bytes│
//! │ uint32 BE│       │                 │
//! └──────────┴───────┴─────────────────┘
//! ```
//!
//! The length counts the kind byte, so an empty payload has length 1.

use bytes::Bytes;

use crate::error::{NetError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Length prefix plus kind byte.
pub const FRAME_HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + 1;

/// Maximum value of the length field (1 MiB, kind byte included).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Payload kind carried in the byte after the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Never sent; marks an unrecognised kind byte.
    Unknown = 0,
    /// `|`-delimited UTF-8 command.
    Text = 1,
    /// Binary command starting with a big-endian command code.
    Binary = 2,
}

impl MessageKind {
    /// Map a kind byte to its variant.
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => MessageKind::Text,
            2 => MessageKind::Binary,
            _ => MessageKind::Unknown,
        }
    }

    /// The byte written on the wire.
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Encode the 5-byte frame header for a payload of `payload_len` bytes.
///
/// # Example
///
/// ```
/// use tickwire::protocol::{encode_header, MessageKind};
///
/// let header = encode_header(MessageKind::Text, 5);
/// assert_eq!(header, [0, 0, 0, 6, 1]);
/// ```
#[inline]
pub fn encode_header(kind: MessageKind, payload_len: usize) -> [u8; FRAME_HEADER_SIZE] {
    let mut buf = [0u8; FRAME_HEADER_SIZE];
    let length = payload_len as u32 + 1;
    buf[0..4].copy_from_slice(&length.to_be_bytes());
    buf[4] = kind.as_byte();
    buf
}

/// Encode a complete frame into a contiguous buffer.
///
/// Fails only when the payload cannot fit under [`MAX_MESSAGE_SIZE`].
pub fn encode_frame(kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>> {
    check_payload_size(payload.len(), MAX_MESSAGE_SIZE)?;
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&encode_header(kind, payload.len()));
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Check that a payload of `len` bytes fits in a frame limited to `max_length`.
pub fn check_payload_size(len: usize, max_length: u32) -> Result<()> {
    if len >= max_length as usize {
        return Err(NetError::Protocol(format!(
            "Payload size {} exceeds maximum {}",
            len,
            max_length.saturating_sub(1)
        )));
    }
    Ok(())
}

/// Read the big-endian length prefix.
#[inline]
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> u32 {
    u32::from_be_bytes(prefix)
}

/// Validate a decoded length prefix.
///
/// A failure here means the peer is out of sync; the connection must be closed.
pub fn validate_length(length: u32, max_length: u32) -> Result<()> {
    if length == 0 {
        return Err(NetError::Protocol("Frame length 0 is invalid".to_string()));
    }
    if length > max_length {
        return Err(NetError::Protocol(format!(
            "Frame length {} exceeds maximum {}",
            length, max_length
        )));
    }
    Ok(())
}

/// Split a frame body (everything after the length prefix) into kind and payload.
///
/// Returns [`NetError::UnknownKind`] for kind bytes other than text/binary.
/// That error only concerns this frame; the stream is still in sync.
pub fn decode_body(body: &Bytes) -> Result<(MessageKind, Bytes)> {
    let Some(&kind_byte) = body.first() else {
        return Err(NetError::Protocol("Frame body is empty".to_string()));
    };
    match MessageKind::from_byte(kind_byte) {
        MessageKind::Unknown => Err(NetError::UnknownKind(kind_byte)),
        kind => Ok((kind, body.slice(1..))),
    }
}
