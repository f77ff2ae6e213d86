//! Primitive type tokens understood by the signature parser and memory subsystem.

use std::fmt;
use std::mem::size_of;

/// One of the closed set of primitive kinds a native signature may use.
///
/// Anything richer (structs, unsized arrays, variadics) is rejected by the
/// parser instead of guessing a marshalling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeToken
{
    /// No value; only valid as a return type.
    Void,
    /// 32-bit signed integer (`int`).
    Int32,
    /// 32-bit unsigned integer (`unsigned int`, `DWORD`).
    UInt32,
    /// IEEE-754 single precision (`float`).
    Float32,
    /// IEEE-754 double precision (`double`).
    Float64,
    /// Opaque pointer-sized value (`void*`, `char*`, `HANDLE`).
    Pointer,
    /// Caller-owned byte buffer of a fixed size, passed by address (`char[16]`).
    FixedBuffer(usize),
}

impl TypeToken
{
    /// Size in bytes of one value of this type, or `None` for `void`.
    ///
    /// For a fixed buffer this is the whole buffer.
    #[must_use]
    pub const fn width(self) -> Option<usize>
    {
        match self {
            TypeToken::Void => None,
            TypeToken::Int32 | TypeToken::UInt32 | TypeToken::Float32 => Some(4),
            TypeToken::Float64 => Some(8),
            TypeToken::Pointer => Some(size_of::<usize>()),
            TypeToken::FixedBuffer(size) => Some(size),
        }
    }

    /// Whether values of this type travel in floating point registers.
    #[must_use]
    pub const fn is_float(self) -> bool
    {
        matches!(self, TypeToken::Float32 | TypeToken::Float64)
    }
}

impl fmt::Display for TypeToken
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            TypeToken::Void => f.write_str("void"),
            TypeToken::Int32 => f.write_str("int"),
            TypeToken::UInt32 => f.write_str("unsigned int"),
            TypeToken::Float32 => f.write_str("float"),
            TypeToken::Float64 => f.write_str("double"),
            TypeToken::Pointer => f.write_str("void*"),
            TypeToken::FixedBuffer(size) => write!(f, "char[{size}]"),
        }
    }
}
