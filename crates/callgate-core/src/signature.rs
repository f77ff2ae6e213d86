//! # Signature Parser
//!
//! Turns C-style type signatures such as `int(int, int)` or
//! `int __stdcall(int, char*)` into a [`SignatureDescriptor`].
//!
//! ## Grammar
//!
//! ```text
//! signature  := return-type [convention] '(' [params] ')'
//!             | return-type '(' [convention] '*' ')' '(' [params] ')'
//! params     := 'void' | type (',' type)*
//! type       := [const] base ['*'...] | byte-base '[' N ']'
//! ```
//!
//! The set of types is closed (see [`TypeToken`]). Anything the parser does
//! not recognise is an error that names the offending token; nothing is
//! coerced or guessed. Parsing is pure and has no side effects.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use smallvec::SmallVec;

use crate::error::{CallgateError, CallgateResult};
use crate::types::TypeToken;

/// Argument passing and stack cleanup discipline of a native function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention
{
    /// The platform's default C convention (`cdecl` on 32-bit x86)
    #[default]
    Default,
    /// Callee cleans the stack (`__stdcall`, `WINAPI`)
    Stdcall,
    /// First two integer arguments in registers (`__fastcall`)
    Fastcall,
}

impl CallingConvention
{
    fn keyword(self) -> Option<&'static str>
    {
        match self {
            CallingConvention::Default => None,
            CallingConvention::Stdcall => Some("__stdcall"),
            CallingConvention::Fastcall => Some("__fastcall"),
        }
    }
}

static CONVENTION_KEYWORDS: Lazy<HashMap<&'static str, CallingConvention>> = Lazy::new(|| {
    HashMap::from([
        ("__cdecl", CallingConvention::Default),
        ("cdecl", CallingConvention::Default),
        ("__stdcall", CallingConvention::Stdcall),
        ("stdcall", CallingConvention::Stdcall),
        ("WINAPI", CallingConvention::Stdcall),
        ("CALLBACK", CallingConvention::Stdcall),
        ("__fastcall", CallingConvention::Fastcall),
        ("fastcall", CallingConvention::Fastcall),
    ])
});

static SCALAR_TYPES: Lazy<HashMap<&'static str, TypeToken>> = Lazy::new(|| {
    HashMap::from([
        ("void", TypeToken::Void),
        ("int", TypeToken::Int32),
        ("int32", TypeToken::Int32),
        ("int32_t", TypeToken::Int32),
        ("signed", TypeToken::Int32),
        ("signed int", TypeToken::Int32),
        ("long", TypeToken::Int32),
        ("BOOL", TypeToken::Int32),
        ("unsigned", TypeToken::UInt32),
        ("unsigned int", TypeToken::UInt32),
        ("uint", TypeToken::UInt32),
        ("uint32", TypeToken::UInt32),
        ("uint32_t", TypeToken::UInt32),
        ("unsigned long", TypeToken::UInt32),
        ("DWORD", TypeToken::UInt32),
        ("UINT", TypeToken::UInt32),
        ("float", TypeToken::Float32),
        ("double", TypeToken::Float64),
        ("pointer", TypeToken::Pointer),
        ("ptr", TypeToken::Pointer),
        ("HANDLE", TypeToken::Pointer),
        ("LPVOID", TypeToken::Pointer),
        ("uintptr_t", TypeToken::Pointer),
        ("size_t", TypeToken::Pointer),
    ])
});

/// Byte-sized bases: only usable behind a pointer or as a fixed buffer.
const BYTE_TYPES: &[&str] = &["char", "unsigned char", "signed char", "uint8_t", "byte", "BYTE"];

/// Parsed, immutable description of a native function's type
///
/// ## Example
///
/// ```rust
/// use callgate_core::signature::{CallingConvention, SignatureDescriptor};
/// use callgate_core::types::TypeToken;
///
/// let sig: SignatureDescriptor = "int __stdcall(int, char*)".parse()?;
/// assert_eq!(sig.return_type(), TypeToken::Int32);
/// assert_eq!(sig.convention(), CallingConvention::Stdcall);
/// assert_eq!(sig.params(), &[TypeToken::Int32, TypeToken::Pointer]);
/// assert_eq!(sig.to_string(), "int __stdcall(int, void*)");
/// # Ok::<(), callgate_core::error::CallgateError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureDescriptor
{
    return_type: TypeToken,
    convention: CallingConvention,
    params: SmallVec<[TypeToken; 8]>,
}

impl SignatureDescriptor
{
    /// Build a descriptor directly from its parts.
    ///
    /// ## Errors
    ///
    /// - `InvalidSignature`: a parameter is `void`, or the return type is a
    ///   fixed buffer
    pub fn new(return_type: TypeToken, convention: CallingConvention, params: &[TypeToken]) -> CallgateResult<Self>
    {
        let descriptor = Self {
            return_type,
            convention,
            params: SmallVec::from_slice(params),
        };
        let text = descriptor.to_string();
        if matches!(return_type, TypeToken::FixedBuffer(_)) {
            return Err(CallgateError::signature(
                &text,
                return_type.to_string(),
                "buffers cannot be returned by value",
            ));
        }
        if params.contains(&TypeToken::Void) {
            return Err(CallgateError::signature(&text, "void", "void is not a valid parameter type"));
        }
        Ok(descriptor)
    }

    /// Parse a signature string.
    ///
    /// ## Errors
    ///
    /// - `InvalidSignature`: missing parameter list, unknown type or
    ///   convention, `void` parameter, variadic or aggregate declarations
    pub fn parse(text: &str) -> CallgateResult<Self>
    {
        let trimmed = text.trim();
        if !trimmed.ends_with(')') {
            return Err(if trimmed.contains('(') {
                let tail = trimmed.rsplit(')').next().unwrap_or(trimmed).trim();
                CallgateError::signature(text, tail, "unexpected text after the parameter list")
            } else {
                CallgateError::malformed_signature(text, "missing parenthesized parameter list")
            });
        }

        let open = matching_open(trimmed)
            .ok_or_else(|| CallgateError::malformed_signature(text, "unbalanced parentheses"))?;
        let params_text = &trimmed[open + 1..trimmed.len() - 1];
        let mut head = trimmed[..open].trim();

        let mut convention = None;
        if let Some(stripped) = head.strip_suffix(')') {
            // Pointer declarator form: `int (__stdcall *)(int)`
            let declarator_open = stripped
                .rfind('(')
                .ok_or_else(|| CallgateError::malformed_signature(text, "unbalanced parentheses"))?;
            let declarator = &stripped[declarator_open + 1..];
            head = stripped[..declarator_open].trim();

            if !declarator.contains('*') {
                return Err(CallgateError::signature(text, declarator.trim(), "expected a pointer declarator"));
            }
            for word in declarator.replace('*', " ").split_whitespace() {
                set_convention(text, &mut convention, word)?;
            }
        }

        let mut return_words = Vec::new();
        for word in head.split_whitespace() {
            if CONVENTION_KEYWORDS.contains_key(word) {
                set_convention(text, &mut convention, word)?;
            } else {
                return_words.push(word);
            }
        }
        if return_words.is_empty() {
            return Err(CallgateError::malformed_signature(text, "missing return type"));
        }
        let return_type = parse_type(text, &return_words.join(" "))?;

        let mut params = SmallVec::<[TypeToken; 8]>::new();
        let params_text = params_text.trim();
        if !params_text.is_empty() && params_text != "void" {
            for raw in params_text.split(',') {
                let raw = raw.trim();
                if raw.is_empty() {
                    return Err(CallgateError::malformed_signature(text, "empty parameter in list"));
                }
                if raw == "..." {
                    return Err(CallgateError::signature(text, raw, "variadic functions are not supported"));
                }
                if raw.contains('(') || raw.contains(')') {
                    return Err(CallgateError::signature(text, raw, "nested declarators are not supported"));
                }
                params.push(parse_type(text, raw)?);
            }
        }

        Self::new(return_type, convention.unwrap_or_default(), &params).map_err(|err| match err {
            CallgateError::InvalidSignature { token, reason, .. } => CallgateError::InvalidSignature {
                signature: text.to_string(),
                token,
                reason,
            },
            other => other,
        })
    }

    /// Declared return type
    pub fn return_type(&self) -> TypeToken
    {
        self.return_type
    }

    /// Declared calling convention
    pub fn convention(&self) -> CallingConvention
    {
        self.convention
    }

    /// Parameter types in declaration order
    pub fn params(&self) -> &[TypeToken]
    {
        &self.params
    }
}

impl FromStr for SignatureDescriptor
{
    type Err = CallgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        Self::parse(s)
    }
}

impl fmt::Display for SignatureDescriptor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.return_type)?;
        if let Some(keyword) = self.convention.keyword() {
            write!(f, " {keyword}")?;
        }
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

impl FromStr for TypeToken
{
    type Err = CallgateError;

    /// Parse a single type name such as `int`, `DWORD`, `char*` or `byte[16]`.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        parse_type(s, s.trim())
    }
}

/// Index of the `(` matching the final `)` of `text`.
fn matching_open(text: &str) -> Option<usize>
{
    let mut depth = 0usize;
    for (i, ch) in text.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn set_convention(signature: &str, slot: &mut Option<CallingConvention>, word: &str) -> CallgateResult<()>
{
    let Some(convention) = CONVENTION_KEYWORDS.get(word) else {
        return Err(CallgateError::signature(signature, word, "unknown calling convention"));
    };
    if slot.is_some() {
        return Err(CallgateError::signature(signature, word, "more than one calling convention"));
    }
    *slot = Some(*convention);
    Ok(())
}

fn parse_type(signature: &str, raw: &str) -> CallgateResult<TypeToken>
{
    if let Some(open) = raw.find('[') {
        let Some(inner) = raw[open + 1..].strip_suffix(']') else {
            return Err(CallgateError::signature(signature, raw, "malformed array declaration"));
        };
        let base = normalize_words(&raw[..open]);
        if !BYTE_TYPES.contains(&base.as_str()) {
            return Err(CallgateError::signature(signature, raw, "fixed buffers must have a byte element type"));
        }
        return match inner.trim().parse::<usize>() {
            Ok(size) if size > 0 => Ok(TypeToken::FixedBuffer(size)),
            _ => Err(CallgateError::signature(signature, raw, "buffer size must be a positive integer")),
        };
    }

    let stars = raw.matches('*').count();
    let base = normalize_words(&raw.replace('*', " "));
    if base.is_empty() {
        return Err(CallgateError::signature(signature, raw, "missing type name"));
    }
    if base == "struct" || base.starts_with("struct ") || base.starts_with("union ") {
        return Err(CallgateError::signature(signature, base, "aggregate types are not supported"));
    }

    if stars > 0 {
        if SCALAR_TYPES.contains_key(base.as_str()) || BYTE_TYPES.contains(&base.as_str()) {
            return Ok(TypeToken::Pointer);
        }
        return Err(CallgateError::signature(signature, base, "unknown type"));
    }

    match SCALAR_TYPES.get(base.as_str()) {
        Some(token) => Ok(*token),
        None if BYTE_TYPES.contains(&base.as_str()) => Err(CallgateError::signature(
            signature,
            base,
            "byte types are only supported behind a pointer or as a fixed buffer",
        )),
        None => Err(CallgateError::signature(signature, base, "unknown type")),
    }
}

/// Collapse whitespace and drop qualifiers that do not affect marshalling.
fn normalize_words(raw: &str) -> String
{
    raw.split_whitespace()
        .filter(|word| !matches!(*word, "const" | "volatile"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn token_of(err: CallgateError) -> Option<String>
    {
        match err {
            CallgateError::InvalidSignature { token, .. } => token,
            other => panic!("expected InvalidSignature, got {other:?}"),
        }
    }

    #[test]
    fn test_matching_open_finds_last_group()
    {
        assert_eq!(matching_open("int(int)"), Some(3));
        assert_eq!(matching_open("int (*)(int)"), Some(7));
        assert_eq!(matching_open("int)"), None);
    }

    #[test]
    fn test_normalize_drops_qualifiers()
    {
        assert_eq!(normalize_words("  const   unsigned   int "), "unsigned int");
        assert_eq!(normalize_words("volatile char"), "char");
    }

    #[test]
    fn test_pointer_declarator_convention()
    {
        let sig = SignatureDescriptor::parse("int (__fastcall *)(int, int)").unwrap();
        assert_eq!(sig.convention(), CallingConvention::Fastcall);
        assert_eq!(sig.params().len(), 2);
    }

    #[test]
    fn test_duplicate_convention_is_rejected()
    {
        let err = SignatureDescriptor::parse("int __stdcall __cdecl(int)").unwrap_err();
        assert_eq!(token_of(err).as_deref(), Some("__cdecl"));
    }

    #[test]
    fn test_single_type_names()
    {
        assert_eq!("DWORD".parse::<TypeToken>().unwrap(), TypeToken::UInt32);
        assert_eq!(" const char * ".parse::<TypeToken>().unwrap(), TypeToken::Pointer);
        assert_eq!("byte[16]".parse::<TypeToken>().unwrap(), TypeToken::FixedBuffer(16));
        assert!("widget".parse::<TypeToken>().is_err());
    }

    #[test]
    fn test_char_by_value_is_rejected()
    {
        let err = SignatureDescriptor::parse("void(char)").unwrap_err();
        assert_eq!(token_of(err).as_deref(), Some("char"));
    }
}
