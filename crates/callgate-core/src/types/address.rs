//! In-process memory address type and address parsing.

use std::fmt;
use std::ops::Add;

use crate::error::{CallgateError, CallgateResult};

/// Strongly typed in-process memory address
///
/// This wrapper around `usize` keeps addresses from being mixed up with sizes
/// and counts. Every address handled by callgate lives in the current
/// process, so the natural width is the platform pointer width.
///
/// Formatting follows the convention reverse-engineering tools print
/// addresses in: `0x` followed by at least eight upper-case hex digits.
///
/// ## Example
///
/// ```rust
/// use callgate_core::types::Address;
///
/// let addr = Address::new(0x401000);
/// assert_eq!(addr.to_string(), "0x00401000");
/// assert_eq!((addr + 0x10).value(), 0x401010);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(usize);

impl Address
{
    /// Highest address representable on this platform
    pub const MAX: Self = Address(usize::MAX);

    /// Create a new address from a raw value
    pub const fn new(value: usize) -> Self
    {
        Address(value)
    }

    /// Get the raw value of this address
    pub const fn value(self) -> usize
    {
        self.0
    }

    /// Whether this is the null address
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use callgate_core::types::Address;
    ///
    /// let addr = Address::new(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::new(0x1100)));
    /// assert_eq!(addr.checked_add(usize::MAX), None);
    /// ```
    pub fn checked_add(self, offset: usize) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Raw pointer view of this address
    pub fn as_ptr<T>(self) -> *const T
    {
        self.0 as *const T
    }
}

impl From<usize> for Address
{
    fn from(value: usize) -> Self
    {
        Address(value)
    }
}

impl From<Address> for usize
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:08X}", self.0)
    }
}

impl Add<usize> for Address
{
    type Output = Address;

    fn add(self, rhs: usize) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

/// An address as supplied by an operator: text or a number
///
/// Text is always read as hexadecimal, with or without a `0x` prefix, since
/// that is how disassemblers print addresses. Numbers are taken as-is. The
/// numeric form is wide enough to carry values past `usize::MAX` so they can
/// be rejected instead of silently truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressInput
{
    /// Hexadecimal text such as `"0x00401000"` or `"401000"`
    Text(String),
    /// Numeric value
    Numeric(i128),
}

impl AddressInput
{
    /// Validate and convert into an [`Address`] in `[1, Address::MAX]`
    ///
    /// ## Errors
    ///
    /// - `InvalidAddress`: the text is not hexadecimal, or the value is zero,
    ///   negative or larger than the platform maximum
    pub fn resolve(&self) -> CallgateResult<Address>
    {
        let value = match self {
            AddressInput::Text(text) => parse_hex(text)?,
            AddressInput::Numeric(value) => *value,
        };

        if value <= 0 {
            return Err(CallgateError::InvalidAddress(format!("{value} is not a valid function address")));
        }
        usize::try_from(value).map(Address).map_err(|_| {
            CallgateError::InvalidAddress(format!(
                "0x{value:X} exceeds the platform maximum address {}",
                Address::MAX
            ))
        })
    }
}

fn parse_hex(text: &str) -> CallgateResult<i128>
{
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > 32 {
        return Err(CallgateError::InvalidAddress(format!("'{text}' is not a hexadecimal address")));
    }
    i128::from_str_radix(digits, 16)
        .map_err(|_| CallgateError::InvalidAddress(format!("'{text}' is not a hexadecimal address")))
}

impl From<&str> for AddressInput
{
    fn from(text: &str) -> Self
    {
        AddressInput::Text(text.to_string())
    }
}

impl From<String> for AddressInput
{
    fn from(text: String) -> Self
    {
        AddressInput::Text(text)
    }
}

impl From<usize> for AddressInput
{
    fn from(value: usize) -> Self
    {
        AddressInput::Numeric(value as i128)
    }
}

impl From<u64> for AddressInput
{
    fn from(value: u64) -> Self
    {
        AddressInput::Numeric(i128::from(value))
    }
}

impl From<i128> for AddressInput
{
    fn from(value: i128) -> Self
    {
        AddressInput::Numeric(value)
    }
}

impl From<Address> for AddressInput
{
    fn from(address: Address) -> Self
    {
        AddressInput::Numeric(address.value() as i128)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_hex_text_with_and_without_prefix()
    {
        assert_eq!(AddressInput::from("0x401000").resolve().unwrap(), Address::new(0x40_1000));
        assert_eq!(AddressInput::from("401000").resolve().unwrap(), Address::new(0x40_1000));
        assert_eq!(AddressInput::from("0XdeadBEEF").resolve().unwrap(), Address::new(0xDEAD_BEEF));
    }

    #[test]
    fn test_rejects_zero_negative_and_garbage()
    {
        assert!(matches!(AddressInput::from(0usize).resolve(), Err(CallgateError::InvalidAddress(_))));
        assert!(matches!(AddressInput::from("0x0").resolve(), Err(CallgateError::InvalidAddress(_))));
        assert!(matches!(AddressInput::from(-5i128).resolve(), Err(CallgateError::InvalidAddress(_))));
        assert!(matches!(AddressInput::from("0xZZ").resolve(), Err(CallgateError::InvalidAddress(_))));
        assert!(matches!(AddressInput::from("").resolve(), Err(CallgateError::InvalidAddress(_))));
    }

    #[test]
    fn test_rejects_above_platform_maximum()
    {
        let too_big = usize::MAX as i128 + 1;
        assert!(matches!(AddressInput::from(too_big).resolve(), Err(CallgateError::InvalidAddress(_))));
        assert_eq!(AddressInput::from(usize::MAX).resolve().unwrap(), Address::MAX);
    }

    #[test]
    fn test_display_is_padded_upper_hex()
    {
        assert_eq!(Address::new(0x1f).to_string(), "0x0000001F");
        assert_eq!(Address::new(0xDEAD_BEEF).to_string(), "0xDEADBEEF");
    }
}
