//! Request shapes - the closed set of binary request layouts.
//!
//! Every outbound binary request is a command code followed by one of a
//! handful of field layouts. All fields are big-endian.
//!
//! | Shape        | Fields                               | Size |
//! |--------------|--------------------------------------|------|
//! | `Empty`      | -                                    | 0    |
//! | `Id`         | id u32                               | 4    |
//! | `IdPosition` | id u32, x f32, y f32, z f32          | 16   |
//! | `IdValue`    | id u32, value i32                    | 8    |
//! | `Raw`        | id u32, opaque bytes                 | 4+   |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{BinaryPayload, EntityId};
use crate::error::{NetError, Result};

/// Discriminant of [`RequestShape`], used for lookups by command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Empty,
    Id,
    IdPosition,
    IdValue,
    Raw,
}

impl ShapeKind {
    /// Exact encoded size, or the minimum size for `Raw`.
    pub const fn min_len(self) -> usize {
        match self {
            ShapeKind::Empty => 0,
            ShapeKind::Id => 4,
            ShapeKind::IdPosition => 16,
            ShapeKind::IdValue => 8,
            ShapeKind::Raw => 4,
        }
    }

    /// Whether `len` bytes is a valid encoding of this shape.
    pub fn accepts_len(self, len: usize) -> bool {
        match self {
            ShapeKind::Raw => len >= self.min_len(),
            _ => len == self.min_len(),
        }
    }
}

/// Field layout of an outbound binary request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestShape {
    Empty,
    Id(EntityId),
    IdPosition {
        id: EntityId,
        x: f32,
        y: f32,
        z: f32,
    },
    IdValue {
        id: EntityId,
        value: i32,
    },
    Raw {
        id: EntityId,
        data: Bytes,
    },
}

impl RequestShape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            RequestShape::Empty => ShapeKind::Empty,
            RequestShape::Id(_) => ShapeKind::Id,
            RequestShape::IdPosition { .. } => ShapeKind::IdPosition,
            RequestShape::IdValue { .. } => ShapeKind::IdValue,
            RequestShape::Raw { .. } => ShapeKind::Raw,
        }
    }

    /// Encoded size of the fields.
    pub fn encoded_len(&self) -> usize {
        match self {
            RequestShape::Raw { data, .. } => 4 + data.len(),
            other => other.kind().min_len(),
        }
    }

    /// Append the big-endian fields to `out`.
    pub fn encode_into(&self, out: &mut BytesMut) {
        out.reserve(self.encoded_len());
        match self {
            RequestShape::Empty => {}
            RequestShape::Id(id) => out.put_u32(*id),
            RequestShape::IdPosition { id, x, y, z } => {
                out.put_u32(*id);
                out.put_f32(*x);
                out.put_f32(*y);
                out.put_f32(*z);
            }
            RequestShape::IdValue { id, value } => {
                out.put_u32(*id);
                out.put_i32(*value);
            }
            RequestShape::Raw { id, data } => {
                out.put_u32(*id);
                out.put_slice(data);
            }
        }
    }

    /// Encode into a standalone payload.
    pub fn to_payload(&self) -> BinaryPayload {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        BinaryPayload::new(out.freeze())
    }

    /// Decode fields of a known shape.
    pub fn decode(kind: ShapeKind, bytes: &[u8]) -> Result<Self> {
        if !kind.accepts_len(bytes.len()) {
            return Err(NetError::Protocol(format!(
                "{:?} request expects {} bytes, got {}",
                kind,
                kind.min_len(),
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let shape = match kind {
            ShapeKind::Empty => RequestShape::Empty,
            ShapeKind::Id => RequestShape::Id(buf.get_u32()),
            ShapeKind::IdPosition => RequestShape::IdPosition {
                id: buf.get_u32(),
                x: buf.get_f32(),
                y: buf.get_f32(),
                z: buf.get_f32(),
            },
            ShapeKind::IdValue => RequestShape::IdValue {
                id: buf.get_u32(),
                value: buf.get_i32(),
            },
            ShapeKind::Raw => RequestShape::Raw {
                id: buf.get_u32(),
                data: Bytes::copy_from_slice(buf),
            },
        };
        Ok(shape)
    }
}
