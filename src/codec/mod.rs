//! Codec module - serialization of structured payload bodies.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde`
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the format is picked at compile time.

mod msgpack;

pub use msgpack::MsgPackCodec;
