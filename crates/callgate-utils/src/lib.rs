//! # Callgate Utilities
//!
//! Shared utilities for the Callgate workspace, chiefly the diagnostic
//! logging setup built on `tracing`.
//!
//! Diagnostic logging is separate from the operation log kept by
//! `callgate-core`: it reports what the tool itself is doing, for whoever is
//! debugging the tool.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
