//! # In-Process Memory Copies
//!
//! Copies between a caller-owned buffer and an arbitrary address of the
//! current process without risking a fault.
//!
//! A plain `memcpy` from an unmapped address would kill the process, so the
//! copy goes through the kernel, which reports bad addresses as errors:
//!
//! - **Linux**: positional reads/writes on `/proc/self/mem`. Writes go through
//!   the kernel's forced-access path, so read-only pages (such as code) can be
//!   patched.
//! - **macOS**: `mach_vm_read_overwrite()` / `mach_vm_write()` against
//!   `mach_task_self()`.
//!
//! Both operations are all-or-nothing: a transfer that stops short is an error.

use crate::error::{CallgateError, CallgateResult};
use crate::types::Address;

fn failure(address: Address, reason: impl Into<String>) -> CallgateError
{
    CallgateError::MemoryOperationFailed {
        address: address.value() as u64,
        reason: reason.into(),
    }
}

/// Fill `dst` with the bytes starting at `address`.
///
/// ## Errors
///
/// - `MemoryOperationFailed`: any byte of the range is not readable
pub fn read_into(address: Address, dst: &mut [u8]) -> CallgateResult<()>
{
    if dst.is_empty() {
        return Ok(());
    }
    imp::read_into(address, dst)
}

/// Copy all of `src` to `address`.
///
/// ## Errors
///
/// - `MemoryOperationFailed`: any byte of the range is not writable
pub fn write_from(address: Address, src: &[u8]) -> CallgateResult<()>
{
    if src.is_empty() {
        return Ok(());
    }
    imp::write_from(address, src)
}

#[cfg(target_os = "linux")]
mod imp
{
    use std::fs::OpenOptions;
    use std::os::unix::fs::FileExt;

    use super::failure;
    use crate::error::CallgateResult;
    use crate::types::Address;

    const SELF_MEM: &str = "/proc/self/mem";

    pub(super) fn read_into(address: Address, dst: &mut [u8]) -> CallgateResult<()>
    {
        let file = OpenOptions::new()
            .read(true)
            .open(SELF_MEM)
            .map_err(|err| failure(address, format!("cannot open {SELF_MEM}: {err}")))?;
        file.read_exact_at(dst, address.value() as u64)
            .map_err(|err| failure(address, format!("read of {} bytes failed: {err}", dst.len())))
    }

    pub(super) fn write_from(address: Address, src: &[u8]) -> CallgateResult<()>
    {
        let file = OpenOptions::new()
            .write(true)
            .open(SELF_MEM)
            .map_err(|err| failure(address, format!("cannot open {SELF_MEM}: {err}")))?;
        file.write_all_at(src, address.value() as u64)
            .map_err(|err| failure(address, format!("write of {} bytes failed: {err}", src.len())))
    }
}

#[cfg(target_os = "macos")]
mod imp
{
    use mach2::kern_return::KERN_SUCCESS;
    use mach2::message::mach_msg_type_number_t;
    use mach2::traps::mach_task_self;
    use mach2::vm::{mach_vm_read_overwrite, mach_vm_write};
    use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t, vm_offset_t};

    use super::failure;
    use crate::error::CallgateResult;
    use crate::types::Address;

    pub(super) fn read_into(address: Address, dst: &mut [u8]) -> CallgateResult<()>
    {
        let mut copied: mach_vm_size_t = 0;
        let result = unsafe {
            mach_vm_read_overwrite(
                mach_task_self(),
                address.value() as mach_vm_address_t,
                dst.len() as mach_vm_size_t,
                dst.as_mut_ptr() as mach_vm_address_t,
                &mut copied,
            )
        };
        if result != KERN_SUCCESS {
            return Err(failure(address, format!("mach_vm_read_overwrite() failed: {result}")));
        }
        if copied as usize != dst.len() {
            return Err(failure(address, format!("short read: {copied} of {} bytes", dst.len())));
        }
        Ok(())
    }

    pub(super) fn write_from(address: Address, src: &[u8]) -> CallgateResult<()>
    {
        let Ok(count) = mach_msg_type_number_t::try_from(src.len()) else {
            return Err(failure(address, "write is too large"));
        };
        let result = unsafe {
            mach_vm_write(
                mach_task_self(),
                address.value() as mach_vm_address_t,
                src.as_ptr() as vm_offset_t,
                count,
            )
        };
        if result != KERN_SUCCESS {
            return Err(failure(address, format!("mach_vm_write() failed: {result}")));
        }
        Ok(())
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod imp
{
    use super::failure;
    use crate::error::CallgateResult;
    use crate::types::Address;

    pub(super) fn read_into(address: Address, _dst: &mut [u8]) -> CallgateResult<()>
    {
        Err(failure(address, "memory access is not supported on this platform"))
    }

    pub(super) fn write_from(address: Address, _src: &[u8]) -> CallgateResult<()>
    {
        Err(failure(address, "memory access is not supported on this platform"))
    }
}
