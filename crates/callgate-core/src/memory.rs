//! # Memory Access Subsystem
//!
//! Reads and writes arbitrary addresses of the current process.
//!
//! Neither operation ever returns an error. Probing addresses that turn out
//! to be unmapped is routine during exploration, so failures come back as an
//! explicit sentinel ([`MemoryRead::data`] is `None`, [`MemoryWrite::success`]
//! is `false`) and are recorded in the operation log like any other outcome.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{CallgateError, CallgateResult};
use crate::oplog::{LogEntry, MemoryOperation, MemoryRecord, OperationLog};
use crate::platform::memory as raw;
use crate::types::{Address, TypeToken, Value};

/// Largest single read, in bytes. Anything bigger fails like an unreadable range.
pub const MAX_READ_BYTES: usize = 256 * 1024 * 1024;

/// Result of [`MemoryAccess::read_memory`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRead
{
    /// Bytes read, or `None` when the read failed
    pub data: Option<Vec<u8>>,
    /// Number of bytes read; zero on failure
    pub bytes_read: usize,
    /// Element type the read was sized by
    pub type_token: TypeToken,
}

impl MemoryRead
{
    /// Whether the read succeeded
    #[must_use]
    pub fn is_success(&self) -> bool
    {
        self.data.is_some()
    }

    /// Decode the bytes into values of the element type. Empty on failure.
    #[must_use]
    pub fn values(&self) -> Vec<Value>
    {
        self.data
            .as_deref()
            .map(|bytes| Value::decode_all(self.type_token, bytes))
            .unwrap_or_default()
    }
}

/// Result of [`MemoryAccess::write_memory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryWrite
{
    /// Whether every requested byte was written
    pub success: bool,
    /// Number of bytes written; zero on failure
    pub bytes_written: usize,
}

/// Logged, non-raising access to process memory.
#[derive(Debug, Clone)]
pub struct MemoryAccess
{
    log: Arc<OperationLog>,
}

impl MemoryAccess
{
    /// Create a memory accessor that records into `log`.
    #[must_use]
    pub fn new(log: Arc<OperationLog>) -> Self
    {
        Self { log }
    }

    /// Read `count` elements of type `token` starting at `address`.
    ///
    /// The number of bytes read is `count` times the width of `token`. The
    /// read is all-or-nothing: if any byte of the range is unreadable, or the
    /// range is larger than [`MAX_READ_BYTES`], the result is `(None, 0)`.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use callgate_core::memory::MemoryAccess;
    /// use callgate_core::oplog::OperationLog;
    /// use callgate_core::settings::DebugSettings;
    /// use callgate_core::types::{Address, TypeToken};
    ///
    /// let memory = MemoryAccess::new(Arc::new(OperationLog::new(DebugSettings::default())));
    /// let read = memory.read_memory(Address::new(0), 4, TypeToken::Int32);
    /// assert!(read.data.is_none());
    /// assert_eq!(read.bytes_read, 0);
    /// ```
    pub fn read_memory(&self, address: Address, count: usize, token: TypeToken) -> MemoryRead
    {
        let started = Instant::now();
        let size = token.width().and_then(|width| count.checked_mul(width)).unwrap_or(0);
        let result = read_checked(address, count, token);
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (outcome, error) = match result {
            Ok(bytes) => {
                let read = MemoryRead {
                    bytes_read: bytes.len(),
                    data: Some(bytes),
                    type_token: token,
                };
                (read, None)
            }
            Err(err) => {
                warn!(%address, size, error = %err, "Memory read failed");
                let read = MemoryRead {
                    data: None,
                    bytes_read: 0,
                    type_token: token,
                };
                (read, Some(err.to_string()))
            }
        };

        let mut summary = format!("read {size} bytes ({count} x {token}) @ {address}");
        if let Some(reason) = &error {
            summary.push_str(&format!(": {reason}"));
        }
        self.log.record(LogEntry::memory(
            summary,
            error.is_none(),
            Some(duration_ms),
            MemoryRecord {
                operation: MemoryOperation::Read,
                address,
                size,
                transferred: outcome.bytes_read,
                type_token: Some(token),
                error,
            },
        ));
        outcome
    }

    /// Write the first `byte_count` bytes of `data` to `address`.
    ///
    /// All-or-nothing, like reads. `byte_count` larger than `data` fails
    /// without touching memory.
    pub fn write_memory(&self, address: Address, data: &[u8], byte_count: usize) -> MemoryWrite
    {
        let started = Instant::now();
        let result = write_checked(address, data, byte_count);
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (outcome, error) = match result {
            Ok(()) => (
                MemoryWrite {
                    success: true,
                    bytes_written: byte_count,
                },
                None,
            ),
            Err(err) => {
                warn!(%address, size = byte_count, error = %err, "Memory write failed");
                (
                    MemoryWrite {
                        success: false,
                        bytes_written: 0,
                    },
                    Some(err.to_string()),
                )
            }
        };

        let mut summary = format!("write {byte_count} bytes @ {address}");
        if let Some(reason) = &error {
            summary.push_str(&format!(": {reason}"));
        }
        self.log.record(LogEntry::memory(
            summary,
            outcome.success,
            Some(duration_ms),
            MemoryRecord {
                operation: MemoryOperation::Write,
                address,
                size: byte_count,
                transferred: outcome.bytes_written,
                type_token: None,
                error,
            },
        ));
        outcome
    }
}

fn read_checked(address: Address, count: usize, token: TypeToken) -> CallgateResult<Vec<u8>>
{
    let width = token
        .width()
        .filter(|width| *width > 0)
        .ok_or_else(|| failure(address, format!("{token} has no size")))?;
    let size = count
        .checked_mul(width)
        .ok_or_else(|| failure(address, "size overflows the address space"))?;
    check_range(address, size)?;
    if size > MAX_READ_BYTES {
        return Err(failure(
            address,
            format!("read of {size} bytes exceeds the {MAX_READ_BYTES} byte limit"),
        ));
    }

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(size)
        .map_err(|err| failure(address, format!("cannot allocate {size} bytes: {err}")))?;
    buffer.resize(size, 0);
    raw::read_into(address, &mut buffer)?;
    debug!(%address, size, "Read memory");
    Ok(buffer)
}

fn write_checked(address: Address, data: &[u8], byte_count: usize) -> CallgateResult<()>
{
    let Some(bytes) = data.get(..byte_count) else {
        return Err(failure(
            address,
            format!("{byte_count} bytes requested but only {} supplied", data.len()),
        ));
    };
    check_range(address, byte_count)?;
    raw::write_from(address, bytes)?;
    debug!(%address, size = byte_count, "Wrote memory");
    Ok(())
}

/// Reject ranges that cannot be valid before asking the OS.
fn check_range(address: Address, size: usize) -> CallgateResult<()>
{
    if address.is_null() {
        return Err(failure(address, "null address"));
    }
    if size == 0 {
        return Err(failure(address, "zero-length transfer"));
    }
    if address.checked_add(size).is_none() {
        return Err(failure(address, "range wraps past the end of the address space"));
    }
    Ok(())
}

fn failure(address: Address, reason: impl Into<String>) -> CallgateError
{
    CallgateError::MemoryOperationFailed {
        address: address.value() as u64,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_check_range()
    {
        assert!(check_range(Address::new(0), 4).is_err());
        assert!(check_range(Address::new(0x1000), 0).is_err());
        assert!(check_range(Address::MAX, 2).is_err());
        assert!(check_range(Address::new(0x1000), 4).is_ok());
    }

    #[test]
    fn test_void_reads_are_rejected()
    {
        let value = 5u32;
        let address = Address::new(std::ptr::addr_of!(value) as usize);
        assert!(read_checked(address, 1, TypeToken::Void).is_err());
    }

    #[test]
    fn test_oversized_read_is_rejected_before_allocating()
    {
        let value = 5u8;
        let address = Address::new(std::ptr::addr_of!(value) as usize);
        let err = read_checked(address, MAX_READ_BYTES + 1, TypeToken::FixedBuffer(1)).unwrap_err();
        assert!(err.to_string().contains("byte limit"));
    }

    #[test]
    fn test_short_write_data_is_rejected()
    {
        let err = write_checked(Address::new(0x1000), &[1, 2], 4).unwrap_err();
        assert!(err.to_string().contains("only 2 supplied"));
    }
}
