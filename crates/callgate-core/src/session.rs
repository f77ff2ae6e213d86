//! # Session
//!
//! The service object an operator console works against.
//!
//! A [`Session`] owns one registry, one operation log and the engines that
//! use them. Nothing is process-global: two sessions in the same process
//! (for example two tests running in parallel) never see each other's
//! registrations or log entries.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::SessionConfig;
use crate::error::CallgateResult;
use crate::invoke::{ContextCallOutcome, InvocationEngine};
use crate::memory::{MemoryAccess, MemoryRead, MemoryWrite};
use crate::oplog::{LogCategory, LogEntry, OperationLog};
use crate::persistence;
use crate::platform::modules::{self, LoadedModule};
use crate::registry::{FunctionRegistry, RegistryEntry};
use crate::settings::{DebugConfigUpdate, DebugSettings};
use crate::types::{Address, AddressInput, TypeToken, Value};

/// A console session: registry, operation log, invocation and memory access.
///
/// ## Example
///
/// ```rust
/// use callgate_core::{Session, SessionConfig};
///
/// let mut session = Session::new(SessionConfig::default());
/// session.register("Tick", "0x00401000", "void __stdcall(int)", "game tick")?;
/// assert_eq!(session.list().len(), 1);
/// # Ok::<(), callgate_core::CallgateError>(())
/// ```
#[derive(Debug)]
pub struct Session
{
    config: SessionConfig,
    registry: FunctionRegistry,
    log: Arc<OperationLog>,
    engine: InvocationEngine,
    memory: MemoryAccess,
}

impl Session
{
    /// Start a session with `config`.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self
    {
        let log = Arc::new(OperationLog::new(config.debug));
        let engine = InvocationEngine::new(Arc::clone(&log), config.call_timeout);
        let memory = MemoryAccess::new(Arc::clone(&log));
        debug!(?config, "Started session");
        Self {
            config,
            registry: FunctionRegistry::new(),
            log,
            engine,
            memory,
        }
    }

    /// Start a session configured from the environment.
    #[must_use]
    pub fn from_env() -> Self
    {
        Self::new(SessionConfig::from_env())
    }

    /// Configuration the session was started with
    pub fn config(&self) -> &SessionConfig
    {
        &self.config
    }

    /// The function registry
    pub fn registry(&self) -> &FunctionRegistry
    {
        &self.registry
    }

    /// The shared operation log
    pub fn operation_log(&self) -> &Arc<OperationLog>
    {
        &self.log
    }

    /// Change the wait limit for context-switched calls.
    pub fn set_call_timeout(&mut self, timeout: Duration)
    {
        self.config.call_timeout = timeout;
        self.engine.set_timeout(timeout);
    }

    /// Register (or overwrite) a function. See [`FunctionRegistry::register`].
    ///
    /// ## Errors
    ///
    /// - `InvalidName`, `InvalidAddress`, `InvalidSignature`
    pub fn register(
        &mut self,
        name: &str,
        address: impl Into<AddressInput>,
        signature: &str,
        description: &str,
    ) -> CallgateResult<RegistryEntry>
    {
        self.registry.register(name, address, signature, description)
    }

    /// Look up a registered function.
    ///
    /// ## Errors
    ///
    /// - `NotFound`
    pub fn resolve(&self, name: &str) -> CallgateResult<&RegistryEntry>
    {
        self.registry.resolve(name)
    }

    /// Call a registered function on the current thread. See
    /// [`InvocationEngine::call`].
    ///
    /// ## Errors
    ///
    /// - `NotFound`, `ArgumentTypeMismatch`, `UnsupportedSignature`
    pub fn call(&self, name: &str, args: &mut [Value]) -> CallgateResult<Value>
    {
        self.engine.call(&self.registry, name, args)
    }

    /// Run a registered function on a new thread. See
    /// [`InvocationEngine::call_in_main_context`].
    ///
    /// ## Errors
    ///
    /// - `NotFound`, `ArgumentTypeMismatch`
    pub fn call_in_main_context(&self, name: &str, arg: &Value) -> CallgateResult<ContextCallOutcome>
    {
        self.engine.call_in_main_context(&self.registry, name, arg)
    }

    /// Registered functions sorted by name
    pub fn list(&self) -> Vec<&RegistryEntry>
    {
        self.registry.list()
    }

    /// Human readable listing of the registry, one function per line.
    #[must_use]
    pub fn listing(&self) -> String
    {
        render_listing(&self.registry.list())
    }

    /// Read `count` elements of `token` at `address`. Never fails; see
    /// [`MemoryAccess::read_memory`].
    pub fn read_mem(&self, address: Address, count: usize, token: TypeToken) -> MemoryRead
    {
        self.memory.read_memory(address, count, token)
    }

    /// Write the first `byte_count` bytes of `data` to `address`. Never
    /// fails; see [`MemoryAccess::write_memory`].
    pub fn write_mem(&self, address: Address, data: &[u8], byte_count: usize) -> MemoryWrite
    {
        self.memory.write_memory(address, data, byte_count)
    }

    /// Base address of a loaded module; an empty name selects the main executable.
    ///
    /// ## Errors
    ///
    /// - `ModuleNotFound`
    pub fn module_base_address(&self, name: &str) -> CallgateResult<Address>
    {
        self.registry.module_base_address(name)
    }

    /// Every module loaded in the process, main executable first
    pub fn loaded_modules(&self) -> Vec<LoadedModule>
    {
        modules::loaded_modules()
    }

    /// The `k` most recent call records, oldest first
    pub fn show_calls(&self, k: usize) -> Vec<LogEntry>
    {
        self.log.recent(LogCategory::Call, k)
    }

    /// The `k` most recent memory records, oldest first
    pub fn show_memory_ops(&self, k: usize) -> Vec<LogEntry>
    {
        self.log.recent(LogCategory::Memory, k)
    }

    /// Apply a settings update and return the resulting settings. An empty
    /// update only queries.
    pub fn debug_config(&self, update: &DebugConfigUpdate) -> DebugSettings
    {
        if update.is_empty() {
            return self.log.settings();
        }
        self.log.configure(update)
    }

    /// Turn operation logging on or off.
    pub fn debug_enable(&self, enabled: bool) -> DebugSettings
    {
        self.log.set_enabled(enabled)
    }

    /// Empty both operation log categories.
    pub fn clear_logs(&self)
    {
        self.log.clear();
    }

    /// Save the registry to `path`, or to the configured default path.
    ///
    /// ## Errors
    ///
    /// - `FileIo`
    pub fn save(&self, path: Option<&Path>) -> CallgateResult<usize>
    {
        persistence::save(&self.registry, path.unwrap_or(&self.config.registry_path))
    }

    /// Load a saved registry from `path`, or from the configured default path,
    /// merging it into the current registry.
    ///
    /// ## Errors
    ///
    /// - `FileIo`, `Script`, or any registration error
    pub fn load(&mut self, path: Option<&Path>) -> CallgateResult<usize>
    {
        let path = path.unwrap_or(&self.config.registry_path).to_path_buf();
        persistence::load(&mut self.registry, &path)
    }
}

/// Render `entries` as aligned `name  address  signature  description` lines.
#[must_use]
pub fn render_listing(entries: &[&RegistryEntry]) -> String
{
    if entries.is_empty() {
        return "No functions registered\n".to_string();
    }

    let name_width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    let signatures: Vec<String> = entries.iter().map(|e| e.signature.to_string()).collect();
    let signature_width = signatures.iter().map(String::len).max().unwrap_or(0);

    let mut out = String::new();
    for (entry, signature) in entries.iter().zip(&signatures) {
        let line = format!(
            "{:<name_width$}  {}  {:<signature_width$}  {}",
            entry.name, entry.address, signature, entry.description
        );
        let _ = writeln!(out, "{}", line.trim_end());
    }
    let _ = writeln!(out, "{} function(s)", entries.len());
    out
}
