//! Typed marshaling between host values and call-frame bytes
//!
//! Every value that crosses the native boundary implements [`Marshal`], which
//! fixes its [`VariantType`] tag and its byte layout. The layouts are
//! little-endian and fixed-size except for strings, which carry a `u32` length
//! prefix:
//!
//! | Type | Tag | Layout |
//! |------|-----|--------|
//! | `()` | `Nil` | empty |
//! | `bool` | `Bool` | 1 byte, `0` or `1` |
//! | `i64`, `i32` | `Int` | 8 bytes |
//! | `f64`, `f32` | `Float` | 8 bytes |
//! | `String` | `String` | `u32` length + UTF-8 |
//! | `Vector2` | `Vector2` | 2 x `f32` |
//! | handles | `Object` | `u64` instance id |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::callframe::CallFrame;
use crate::error::BindingError;
use crate::handle::RawObject;

/// Type tag of one marshaled slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantType {
    Nil,
    Bool,
    Int,
    Float,
    String,
    Vector2,
    Object,
}

impl VariantType {
    /// Render a signature as `(A, B, C)`
    pub fn describe(types: &[VariantType]) -> String {
        let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
        format!("({})", parts.join(", "))
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 2D vector with `f32` components
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };
    pub const ONE: Vector2 = Vector2 { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Mul<f32> for Vector2 {
    type Output = Vector2;

    fn mul(self, rhs: f32) -> Vector2 {
        Vector2::new(self.x * rhs, self.y * rhs)
    }
}

/// Error type for encoding operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("Value too large to marshal: {len} bytes")]
    TooLarge { len: usize },
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Error type for decoding operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid buffer length: expected {expected} but got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("Corrupted data: {0}")]
    CorruptedData(String),
    #[error("Value {value} does not fit in {target}")]
    OutOfRange { value: String, target: &'static str },
    #[error("Expected {expected} arguments but the frame holds {actual}")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("Slot holds {actual} but {expected} was requested")]
    TypeMismatch {
        expected: VariantType,
        actual: VariantType,
    },
    #[error("Return slot has not been written")]
    MissingReturn,
}

/// A value with a fixed native representation
pub trait Marshal: Sized {
    /// Tag recorded in the frame slot for this value
    const TYPE: VariantType;

    /// Append the encoded value to `out`
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError>;

    /// Decode a value from exactly the bytes of one slot
    fn decode(buf: &[u8]) -> Result<Self, DecodeError>;
}

fn fixed<const N: usize>(buf: &[u8]) -> Result<[u8; N], DecodeError> {
    buf.try_into().map_err(|_| DecodeError::InvalidLength {
        expected: N,
        actual: buf.len(),
    })
}

impl Marshal for () {
    const TYPE: VariantType = VariantType::Nil;

    fn encode(&self, _out: &mut Vec<u8>) -> Result<(), EncodeError> {
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        fixed::<0>(buf).map(|_| ())
    }
}

impl Marshal for bool {
    const TYPE: VariantType = VariantType::Bool;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.push(u8::from(*self));
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        match fixed::<1>(buf)? {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(DecodeError::CorruptedData(format!(
                "invalid bool byte {other}"
            ))),
        }
    }
}

impl Marshal for i64 {
    const TYPE: VariantType = VariantType::Int;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        Ok(i64::from_le_bytes(fixed(buf)?))
    }
}

impl Marshal for i32 {
    const TYPE: VariantType = VariantType::Int;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        i64::from(*self).encode(out)
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let wide = i64::decode(buf)?;
        i32::try_from(wide).map_err(|_| DecodeError::OutOfRange {
            value: wide.to_string(),
            target: "i32",
        })
    }
}

impl Marshal for f64 {
    const TYPE: VariantType = VariantType::Float;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        Ok(f64::from_le_bytes(fixed(buf)?))
    }
}

impl Marshal for f32 {
    const TYPE: VariantType = VariantType::Float;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        f64::from(*self).encode(out)
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        Ok(f64::decode(buf)? as f32)
    }
}

impl Marshal for String {
    const TYPE: VariantType = VariantType::String;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        let len = u32::try_from(self.len()).map_err(|_| EncodeError::TooLarge {
            len: self.len(),
        })?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(self.as_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < 4 {
            return Err(DecodeError::InvalidLength {
                expected: 4,
                actual: buf.len(),
            });
        }
        let (prefix, body) = buf.split_at(4);
        let len = u32::from_le_bytes(fixed(prefix)?) as usize;
        if body.len() != len {
            return Err(DecodeError::InvalidLength {
                expected: len + 4,
                actual: buf.len(),
            });
        }
        String::from_utf8(body.to_vec())
            .map_err(|e| DecodeError::CorruptedData(format!("invalid UTF-8: {e}")))
    }
}

impl Marshal for Vector2 {
    const TYPE: VariantType = VariantType::Vector2;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let bytes: [u8; 8] = fixed(buf)?;
        let x = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let y = f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Vector2 { x, y })
    }
}

impl Marshal for RawObject {
    const TYPE: VariantType = VariantType::Object;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.extend_from_slice(&self.id().to_le_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        Ok(RawObject::from_id(u64::from_le_bytes(fixed(buf)?)))
    }
}

/// A statically-known argument list, written to a frame in declaration order
pub trait MarshalArgs: Sized {
    /// Slot types in declaration order
    fn types() -> Vec<VariantType>;

    /// Marshal every argument into `frame`
    fn write(&self, frame: &mut CallFrame) -> Result<(), BindingError>;

    /// Read the full argument list back out of `frame`
    fn read(frame: &CallFrame) -> Result<Self, BindingError>;
}

macro_rules! impl_marshal_args {
    ($($name:ident : $idx:tt),*) => {
        impl<$($name: Marshal),*> MarshalArgs for ($($name,)*) {
            fn types() -> Vec<VariantType> {
                vec![$($name::TYPE),*]
            }

            #[allow(unused_variables)]
            fn write(&self, frame: &mut CallFrame) -> Result<(), BindingError> {
                $(frame.push_arg(&self.$idx)?;)*
                Ok(())
            }

            fn read(frame: &CallFrame) -> Result<Self, BindingError> {
                frame.expect_arity(Self::types().len())?;
                Ok(($(frame.arg::<$name>($idx)?,)*))
            }
        }
    };
}

impl_marshal_args!();
impl_marshal_args!(A: 0);
impl_marshal_args!(A: 0, B: 1);
impl_marshal_args!(A: 0, B: 1, C: 2);
impl_marshal_args!(A: 0, B: 1, C: 2, D: 3);
impl_marshal_args!(A: 0, B: 1, C: 2, D: 3, E: 4);

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<T: Marshal>(value: &T) -> Vec<u8> {
        let mut out = Vec::new();
        value.encode(&mut out).unwrap();
        out
    }

    #[test]
    fn test_fixed_layouts() {
        assert!(encoded(&()).is_empty());
        assert_eq!(encoded(&true), vec![1]);
        assert_eq!(encoded(&-1i64), vec![0xFF; 8]);
        assert_eq!(encoded(&7i32).len(), 8);
        assert_eq!(encoded(&1.5f32), 1.5f64.to_le_bytes().to_vec());
        assert_eq!(encoded(&Vector2::new(1.0, 2.0)).len(), 8);
        assert_eq!(encoded(&RawObject::from_id(258)), {
            let mut v = vec![2, 1];
            v.extend_from_slice(&[0; 6]);
            v
        });
    }

    #[test]
    fn test_string_layout() {
        let bytes = encoded(&"héllo".to_string());
        assert_eq!(&bytes[..4], &6u32.to_le_bytes());
        assert_eq!(String::decode(&bytes).unwrap(), "héllo");
    }

    #[test]
    fn test_string_truncated() {
        let mut bytes = encoded(&"abcdef".to_string());
        bytes.truncate(7);
        assert_eq!(
            String::decode(&bytes),
            Err(DecodeError::InvalidLength {
                expected: 10,
                actual: 7
            })
        );
        assert!(matches!(
            String::decode(&[1, 0]),
            Err(DecodeError::InvalidLength { expected: 4, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xC3, 0x28]);
        assert!(matches!(
            String::decode(&bytes),
            Err(DecodeError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_bool_rejects_garbage() {
        assert!(matches!(
            bool::decode(&[2]),
            Err(DecodeError::CorruptedData(_))
        ));
        assert!(matches!(
            bool::decode(&[]),
            Err(DecodeError::InvalidLength {
                expected: 1,
                actual: 0
            })
        ));
    }

    #[test]
    fn test_i32_out_of_range() {
        let bytes = encoded(&(i64::from(i32::MAX) + 1));
        assert!(matches!(
            i32::decode(&bytes),
            Err(DecodeError::OutOfRange { target: "i32", .. })
        ));
        assert_eq!(i32::decode(&encoded(&-5i64)).unwrap(), -5);
    }

    #[test]
    fn test_describe_signature() {
        assert_eq!(VariantType::describe(&[]), "()");
        assert_eq!(
            VariantType::describe(&[VariantType::Int, VariantType::Object]),
            "(Int, Object)"
        );
    }

    #[test]
    fn test_args_types() {
        assert!(<()>::types().is_empty());
        assert_eq!(
            <(String, Vector2, bool)>::types(),
            vec![VariantType::String, VariantType::Vector2, VariantType::Bool]
        );
    }

    #[test]
    fn test_vector_ops() {
        let v = Vector2::new(1.0, 2.0) + Vector2::ONE * 2.0;
        assert_eq!(v, Vector2::new(3.0, 4.0));
    }
}
