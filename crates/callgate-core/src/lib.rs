//! # callgate-core
//!
//! Dynamic registration and invocation of native functions inside the
//! current process, plus memory probing and a bounded operation log.
//!
//! Functions are described by address and C-style type signature, usually as
//! they are discovered in a disassembler, and then called live to confirm
//! what they do:
//!
//! - [`signature`]: parses `"int __stdcall(int, char*)"` into a
//!   [`SignatureDescriptor`]
//! - [`registry`]: validated name → address + signature bindings
//! - [`invoke`]: direct and context-switched calls
//! - [`memory`]: non-raising reads and writes of arbitrary addresses
//! - [`oplog`]: ring buffers of recent calls and memory operations
//! - [`persistence`]: saving and reloading the registry as a statement script
//! - [`Session`]: one owned object tying all of the above together
//!
//! ## Platform Support
//!
//! - **Linux**: `/proc/self/mem` for memory, `dl_iterate_phdr()` for modules
//! - **macOS**: Mach VM calls for memory, the dyld image list for modules
//! - Native calls: x86_64 (System V), aarch64 and 32-bit x86
//!
//! ## Why unsafe code is needed
//!
//! Calling an address as a function cannot be expressed in safe Rust. All of
//! that is confined to [`platform`]; the rest of the crate only handles
//! validated descriptors and typed values.
//!
//! Nothing is sandboxed. A called function runs with the full privileges of
//! the process and can corrupt or crash it.

#![allow(unsafe_code)] // Required for native calls and raw memory access

pub mod config;
pub mod error;
pub mod invoke;
pub mod memory;
pub mod oplog;
pub mod persistence;
pub mod platform;
pub mod prelude;
pub mod registry;
pub mod script;
pub mod session;
pub mod settings;
pub mod signature;
pub mod types;

pub use config::SessionConfig;
// Re-export commonly used types
pub use error::{CallgateError, CallgateResult};
pub use invoke::ContextCallOutcome;
pub use registry::{FunctionRegistry, RegistryEntry};
pub use session::Session;
pub use signature::{CallingConvention, SignatureDescriptor};
pub use types::{Address, TypeToken, Value};
