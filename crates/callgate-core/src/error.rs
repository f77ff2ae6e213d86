//! # Error Types
//!
//! General error handling for registration, invocation and persistence.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! ## Propagation
//!
//! Registration-time and argument-validation errors are raised before any
//! native code runs. They are the only safety net: once a call reaches the
//! target address it is unsupervised, and a fault inside the callee takes the
//! whole process down.
//!
//! Memory operations never return [`CallgateError::MemoryOperationFailed`] to
//! their callers. Probing bad addresses is expected during exploration, so the
//! memory subsystem converts failures into an explicit sentinel result instead.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for callgate operations
///
/// ## Error Categories
///
/// 1. **Registration errors**: InvalidName, InvalidAddress, InvalidSignature
/// 2. **Lookup errors**: NotFound, ModuleNotFound
/// 3. **Invocation errors**: ArgumentTypeMismatch, UnsupportedSignature,
///    ThreadCreationFailed, CallTimeout
/// 4. **Persistence errors**: FileIo, Script
/// 5. **Memory errors**: MemoryOperationFailed (internal, never propagated)
/// 6. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum CallgateError
{
    /// A function name was empty or otherwise unusable as a registry key
    #[error("Invalid function name: {0}")]
    InvalidName(String),

    /// An address could not be parsed or lies outside `[1, usize::MAX]`
    ///
    /// Address zero is always rejected. Values above the platform's maximum
    /// pointer value are rejected rather than truncated.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A type signature failed to parse
    ///
    /// `token` names the offending piece of the signature when one can be
    /// singled out (for example the unknown return type in `foo(int)`).
    #[error("Invalid signature '{signature}': {reason}")]
    InvalidSignature
    {
        /// The full signature text as given by the caller
        signature: String,
        /// The token that could not be understood, if any
        token: Option<String>,
        /// Human readable description of the problem
        reason: String,
    },

    /// No function with the given name is registered
    #[error("Function not found: {0}")]
    NotFound(String),

    /// No loaded module matches the given name
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// Arguments did not match the registered signature
    ///
    /// Raised for arity mismatches as well as for values whose kind is not
    /// compatible with the declared parameter type. Always raised before the
    /// native call is attempted.
    #[error("Argument mismatch calling {function}: {reason}")]
    ArgumentTypeMismatch
    {
        /// Name of the registered function being called
        function: String,
        /// What was wrong with the arguments
        reason: String,
    },

    /// The signature cannot be dispatched on the current target
    ///
    /// For example more integer arguments than the register dispatcher
    /// supports, or any native call on an architecture without a dispatcher.
    #[error("Unsupported signature: {0}")]
    UnsupportedSignature(String),

    /// The OS refused to create the thread for a context-switched call
    #[error("Failed to create thread: {0}")]
    ThreadCreationFailed(String),

    /// A context-switched call did not finish within its timeout
    ///
    /// The spawned thread is not terminated and may still be running.
    #[error("Call to {function} timed out after {timeout_ms} ms")]
    CallTimeout
    {
        /// Name of the registered function being called
        function: String,
        /// The timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// A registry file could not be read or written
    #[error("File error for {}: {source}", path.display())]
    FileIo
    {
        /// Path of the file being saved or loaded
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A statement script (such as a saved registry) failed to parse or run
    #[error("Script error at line {line}: {message}")]
    Script
    {
        /// 1-based line number of the failing statement
        line: usize,
        /// Description of the failure
        message: String,
    },

    /// A memory read or write failed
    ///
    /// Only used inside the memory subsystem; the public memory operations
    /// report failure through their return value instead.
    #[error("Memory operation failed at 0x{address:08X}: {reason}")]
    MemoryOperationFailed
    {
        /// Address of the attempted access
        address: u64,
        /// Why the access failed
        reason: String,
    },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CallgateError
{
    /// Build an [`CallgateError::InvalidSignature`] that names the offending token.
    pub(crate) fn signature(signature: &str, token: impl Into<String>, reason: impl Into<String>) -> Self
    {
        Self::InvalidSignature {
            signature: signature.to_string(),
            token: Some(token.into()),
            reason: reason.into(),
        }
    }

    /// Build an [`CallgateError::InvalidSignature`] without a specific token.
    pub(crate) fn malformed_signature(signature: &str, reason: impl Into<String>) -> Self
    {
        Self::InvalidSignature {
            signature: signature.to_string(),
            token: None,
            reason: reason.into(),
        }
    }

    /// Build an [`CallgateError::ArgumentTypeMismatch`] for `function`.
    pub(crate) fn mismatch(function: &str, reason: impl Into<String>) -> Self
    {
        Self::ArgumentTypeMismatch {
            function: function.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for `Result<T, CallgateError>`
///
/// ```rust
/// use callgate_core::error::CallgateResult;
/// fn foo() -> CallgateResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type CallgateResult<T> = std::result::Result<T, CallgateError>;
