//! # Platform-Specific Implementations
//!
//! Everything that touches the operating system or the machine ABI lives
//! here, behind safe signatures:
//!
//! - [`native`]: builds and performs a native call from a
//!   [`SignatureDescriptor`](crate::signature::SignatureDescriptor) and an
//!   address. This is the only place an integer becomes a function pointer.
//! - [`memory`]: fault-free copies to and from arbitrary addresses of the
//!   current process
//!   - **Linux**: `/proc/self/mem`
//!   - **macOS**: `mach_vm_read_overwrite()` / `mach_vm_write()` on `mach_task_self()`
//! - [`modules`]: enumeration of loaded modules and their base addresses
//!   - **Linux**: `dl_iterate_phdr()`
//!   - **macOS**: the dyld image list
//!
//! Other targets compile, but memory access and module lookup always fail and
//! native calls report `UnsupportedSignature`.

pub mod memory;
pub mod modules;
pub mod native;
