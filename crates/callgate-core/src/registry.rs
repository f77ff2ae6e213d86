//! # Function Registry
//!
//! Owns the mapping from function name to validated [`RegistryEntry`].
//!
//! Every entry in the registry has passed name, address and signature
//! validation, so the invocation engine never sees raw, unchecked input.
//! Registering a name that already exists replaces the old entry and logs a
//! warning; it is never an error.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{CallgateError, CallgateResult};
use crate::platform::modules;
use crate::signature::SignatureDescriptor;
use crate::types::{Address, AddressInput};

/// A named, validated binding of a function name to an address and signature.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry
{
    /// Unique, case-sensitive function name
    pub name: String,
    /// Entry point of the function in the current process
    pub address: Address,
    /// Parsed type signature
    pub signature: SignatureDescriptor,
    /// Free-form operator notes
    pub description: String,
    /// When the entry was registered
    pub registered_at: DateTime<Utc>,
}

/// Name-keyed store of registered functions.
///
/// ## Thread Safety
///
/// The registry is not internally synchronized. Registration always completes
/// before any lookup starts, so it is owned by a single [`crate::Session`].
#[derive(Debug, Default)]
pub struct FunctionRegistry
{
    entries: HashMap<String, RegistryEntry>,
}

impl FunctionRegistry
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Validate and register a function.
    ///
    /// The address may be hexadecimal text (`"0x401000"`, `"401000"`) or a
    /// number, and must lie in `[1, Address::MAX]`. An existing entry with the
    /// same name is overwritten.
    ///
    /// ## Errors
    ///
    /// - `InvalidName`: `name` is blank or contains control characters
    /// - `InvalidAddress`: `address` is unparseable, zero or out of range
    /// - `InvalidSignature`: `signature` does not parse
    ///
    /// ## Example
    ///
    /// ```rust
    /// use callgate_core::registry::FunctionRegistry;
    ///
    /// let mut registry = FunctionRegistry::new();
    /// let entry = registry.register("GetGold", "0x00401000", "int(void)", "player gold")?;
    /// assert_eq!(entry.address.value(), 0x401000);
    /// # Ok::<(), callgate_core::error::CallgateError>(())
    /// ```
    pub fn register(
        &mut self,
        name: &str,
        address: impl Into<AddressInput>,
        signature: &str,
        description: &str,
    ) -> CallgateResult<RegistryEntry>
    {
        validate_name(name)?;
        let address = address.into().resolve()?;
        let signature = SignatureDescriptor::parse(signature)?;

        let entry = RegistryEntry {
            name: name.to_string(),
            address,
            signature,
            description: description.to_string(),
            registered_at: Utc::now(),
        };

        if let Some(previous) = self.entries.insert(entry.name.clone(), entry.clone()) {
            warn!(
                name = %entry.name,
                old_address = %previous.address,
                new_address = %entry.address,
                "Overwriting existing registration"
            );
        } else {
            info!(name = %entry.name, address = %entry.address, signature = %entry.signature, "Registered function");
        }

        Ok(entry)
    }

    /// Look up a registered function by name.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: no function with that name is registered
    pub fn resolve(&self, name: &str) -> CallgateResult<&RegistryEntry>
    {
        self.entries.get(name).ok_or_else(|| {
            debug!(name, "Lookup of unregistered function");
            CallgateError::NotFound(name.to_string())
        })
    }

    /// All registered entries, sorted by name.
    pub fn list(&self) -> Vec<&RegistryEntry>
    {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Number of registered functions
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether no function is registered
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Base address of a module loaded in the current process.
    ///
    /// Useful for turning the image-relative offsets a disassembler shows into
    /// live addresses. An empty name selects the main executable.
    ///
    /// ## Errors
    ///
    /// - `ModuleNotFound`: no loaded module matches `module_name`
    pub fn module_base_address(&self, module_name: &str) -> CallgateResult<Address>
    {
        modules::module_base_address(module_name)
    }
}

fn validate_name(name: &str) -> CallgateResult<()>
{
    if name.trim().is_empty() {
        return Err(CallgateError::InvalidName("function name must not be empty".to_string()));
    }
    if name.chars().any(char::is_control) {
        return Err(CallgateError::InvalidName(format!(
            "{name:?} contains control characters"
        )));
    }
    Ok(())
}
