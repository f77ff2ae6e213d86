//! Typed values exchanged with the scripting environment.
//!
//! Arguments flow in as an ordered list of [`Value`]s and a single [`Value`]
//! flows back out. The compatibility rules between values and
//! [`TypeToken`]s live here so every component agrees on them.

use std::fmt;
use std::mem::size_of;

use super::token::TypeToken;

/// A dynamically typed argument or return value
#[derive(Debug, Clone, PartialEq)]
pub enum Value
{
    /// Result of a `void` function
    Void,
    /// Numeric literal without a fractional part
    Int(i64),
    /// Numeric literal with a fractional part
    Float(f64),
    /// Raw pointer or opaque handle
    Pointer(usize),
    /// Byte buffer, passed to native code by address
    Buffer(Vec<u8>),
}

impl Value
{
    /// Short name of the value's kind, used in mismatch messages.
    #[must_use]
    pub fn kind(&self) -> &'static str
    {
        match self {
            Value::Void => "void",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Pointer(_) => "pointer",
            Value::Buffer(_) => "buffer",
        }
    }

    /// Check whether this value may be passed for a parameter of type `token`.
    ///
    /// ## Errors
    ///
    /// Returns a description of the incompatibility.
    pub fn check_compatible(&self, token: TypeToken) -> Result<(), String>
    {
        let compatible = match (token, self) {
            (TypeToken::Int32, _) => self
                .integral()
                .is_some_and(|v| (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&v)),
            (TypeToken::UInt32, _) => self.integral().is_some_and(|v| (0..=i64::from(u32::MAX)).contains(&v)),
            (TypeToken::Float32 | TypeToken::Float64, Value::Int(_) | Value::Float(_)) => true,
            (TypeToken::Pointer, Value::Pointer(_)) => true,
            (TypeToken::FixedBuffer(size), Value::Buffer(bytes)) => {
                if bytes.len() != size {
                    return Err(format!("expected a {size}-byte buffer, got {} bytes", bytes.len()));
                }
                true
            }
            _ => false,
        };

        if compatible {
            Ok(())
        } else {
            Err(format!("{} value {self} is not compatible with {token}", self.kind()))
        }
    }

    /// Integer view of a numeric value, if it has no fractional part.
    fn integral(&self) -> Option<i64>
    {
        match *self {
            Value::Int(v) => Some(v),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() && v.abs() < 9.0e15 => Some(v as i64),
            _ => None,
        }
    }

    /// Numeric view as a double, used for float parameters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64>
    {
        match *self {
            Value::Int(v) => Some(v as f64),
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Integer view of the value, used for integer parameters.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64>
    {
        self.integral()
    }

    /// Decode consecutive values of type `token` from raw memory in native byte order.
    ///
    /// Trailing bytes that do not fill a whole value are ignored. `void`
    /// decodes to nothing.
    #[must_use]
    pub fn decode_all(token: TypeToken, bytes: &[u8]) -> Vec<Value>
    {
        let Some(width) = token.width().filter(|w| *w > 0) else {
            return Vec::new();
        };
        bytes.chunks_exact(width).map(|chunk| Self::decode(token, chunk)).collect()
    }

    fn decode(token: TypeToken, chunk: &[u8]) -> Value
    {
        let word4 = || <[u8; 4]>::try_from(&chunk[..4]).unwrap_or_default();
        let word8 = || <[u8; 8]>::try_from(&chunk[..8]).unwrap_or_default();

        match token {
            TypeToken::Void => Value::Void,
            TypeToken::Int32 => Value::Int(i64::from(i32::from_ne_bytes(word4()))),
            TypeToken::UInt32 => Value::Int(i64::from(u32::from_ne_bytes(word4()))),
            TypeToken::Float32 => Value::Float(f64::from(f32::from_ne_bytes(word4()))),
            TypeToken::Float64 => Value::Float(f64::from_ne_bytes(word8())),
            TypeToken::Pointer => {
                let mut word = [0u8; size_of::<usize>()];
                word.copy_from_slice(&chunk[..size_of::<usize>()]);
                Value::Pointer(usize::from_ne_bytes(word))
            }
            TypeToken::FixedBuffer(_) => Value::Buffer(chunk.to_vec()),
        }
    }
}

impl fmt::Display for Value
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Value::Void => f.write_str("void"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Pointer(v) => write!(f, "0x{v:08X}"),
            Value::Buffer(bytes) => write!(f, "<buffer {} bytes>", bytes.len()),
        }
    }
}
