//! MessagePack bodies for envelopes and trait state.
//!
//! Used for the serialized body inside binary response envelopes and for
//! trait state written into sync requests. Structs are encoded as maps
//! (`to_vec_named`) so that field order changes on either side do not
//! silently shift values.
//!
//! # Example
//!
//! ```
//! use tickwire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Health {
//!     current: u32,
//!     max: u32,
//! }
//!
//! let state = Health { current: 80, max: 100 };
//! let encoded = MsgPackCodec::encode(&state).unwrap();
//! let decoded: Health = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, state);
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::Result;

/// Stateless MsgPack encoder/decoder (`rmp-serde`, named fields).
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Serialize `value` into a fresh buffer.
    ///
    /// # Errors
    ///
    /// [`NetError::MsgPackEncode`](crate::NetError::MsgPackEncode) for
    /// values serde cannot represent.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Encode a value onto the end of an existing buffer.
    ///
    /// Lets callers keep one scratch buffer across many encodes.
    pub fn encode_into<T: serde::Serialize>(value: &T, out: &mut BytesMut) -> Result<()> {
        let mut writer = out.writer();
        rmp_serde::encode::write_named(&mut writer, value)?;
        Ok(())
    }

    /// Deserialize a complete MsgPack value.
    ///
    /// # Errors
    ///
    /// [`NetError::MsgPackDecode`](crate::NetError::MsgPackDecode) when the
    /// bytes are truncated or do not match `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
