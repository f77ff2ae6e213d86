//! Common module for library exports

pub use crate::config::SessionConfig;
pub use crate::error::{CallgateError, CallgateResult};
pub use crate::invoke::{ContextCallOutcome, InvocationEngine};
pub use crate::memory::{MemoryAccess, MemoryRead, MemoryWrite};
pub use crate::oplog::{LogCategory, LogEntry, OperationLog, ThreadType};
pub use crate::registry::{FunctionRegistry, RegistryEntry};
pub use crate::session::Session;
pub use crate::settings::{DebugConfigUpdate, DebugSettings};
pub use crate::signature::{CallingConvention, SignatureDescriptor};
pub use crate::types::{Address, AddressInput, TypeToken, Value};
