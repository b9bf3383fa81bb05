//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the framing of the game connection:
//! - 4-byte length prefix plus 1-byte message kind
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame_parts, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    check_payload_size, decode_body, decode_length, encode_frame, encode_header, validate_length,
    MessageKind, FRAME_HEADER_SIZE, LENGTH_PREFIX_SIZE, MAX_MESSAGE_SIZE,
};
