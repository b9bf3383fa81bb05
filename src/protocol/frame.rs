//! Frame struct with typed accessors.
//!
//! Represents one decoded frame: its kind and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use tickwire::protocol::{Frame, MessageKind};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(MessageKind::Text, Bytes::from_static(b"C_PING"));
//!
//! assert!(frame.is_text());
//! assert_eq!(frame.payload(), b"C_PING");
//! assert_eq!(frame.wire_length(), 7);
//! ```

use bytes::Bytes;

use super::wire_format::{encode_header, MessageKind, FRAME_HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload kind.
    pub kind: MessageKind,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from kind and payload.
    pub fn new(kind: MessageKind, payload: Bytes) -> Self {
        Self { kind, payload }
    }

    /// Create a frame from kind and raw bytes (copies data).
    pub fn from_parts(kind: MessageKind, payload: &[u8]) -> Self {
        Self {
            kind,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Value of the length prefix for this frame (payload plus kind byte).
    #[inline]
    pub fn wire_length(&self) -> u32 {
        self.payload.len() as u32 + 1
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        self.kind == MessageKind::Text
    }

    #[inline]
    pub fn is_binary(&self) -> bool {
        self.kind == MessageKind::Binary
    }
}

/// Build frame parts for scatter/gather I/O.
///
/// Returns the encoded 5-byte header and a reference to the payload,
/// avoiding a copy for writev-style operations.
pub fn build_frame_parts(kind: MessageKind, payload: &[u8]) -> ([u8; FRAME_HEADER_SIZE], &[u8]) {
    (encode_header(kind, payload.len()), payload)
}
