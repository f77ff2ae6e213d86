//! Operation log settings.

use std::fmt;

/// Default capacity of each operation log ring buffer
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 1000;

/// What the operation log records, and how much of it it keeps.
///
/// Created once when a session starts and only changed through
/// [`DebugSettings::apply`]; never reset implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugSettings
{
    /// Master switch; nothing is recorded while this is off
    pub enabled: bool,
    /// Record function calls
    pub log_calls: bool,
    /// Include argument values in call records
    pub log_parameters: bool,
    /// Include return values in call records
    pub log_return_values: bool,
    /// Record memory reads and writes
    pub log_memory_ops: bool,
    /// Capacity of each category's ring buffer (at least 1)
    pub max_log_entries: usize,
}

impl Default for DebugSettings
{
    fn default() -> Self
    {
        Self {
            enabled: true,
            log_calls: true,
            log_parameters: true,
            log_return_values: true,
            log_memory_ops: true,
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
        }
    }
}

impl DebugSettings
{
    /// Apply a partial update. Unset fields keep their current value.
    ///
    /// A capacity of zero is raised to one.
    pub fn apply(&mut self, update: &DebugConfigUpdate)
    {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(log_calls) = update.log_calls {
            self.log_calls = log_calls;
        }
        if let Some(log_parameters) = update.log_parameters {
            self.log_parameters = log_parameters;
        }
        if let Some(log_return_values) = update.log_return_values {
            self.log_return_values = log_return_values;
        }
        if let Some(log_memory_ops) = update.log_memory_ops {
            self.log_memory_ops = log_memory_ops;
        }
        if let Some(max) = update.max_log_entries {
            self.max_log_entries = max.max(1);
        }
    }
}

impl fmt::Display for DebugSettings
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        writeln!(f, "enabled          = {}", self.enabled)?;
        writeln!(f, "logCalls         = {}", self.log_calls)?;
        writeln!(f, "logParameters    = {}", self.log_parameters)?;
        writeln!(f, "logReturnValues  = {}", self.log_return_values)?;
        writeln!(f, "logMemoryOps     = {}", self.log_memory_ops)?;
        write!(f, "maxLogEntries    = {}", self.max_log_entries)
    }
}

/// Partial update of [`DebugSettings`]; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugConfigUpdate
{
    /// New value for [`DebugSettings::enabled`]
    pub enabled: Option<bool>,
    /// New value for [`DebugSettings::log_calls`]
    pub log_calls: Option<bool>,
    /// New value for [`DebugSettings::log_parameters`]
    pub log_parameters: Option<bool>,
    /// New value for [`DebugSettings::log_return_values`]
    pub log_return_values: Option<bool>,
    /// New value for [`DebugSettings::log_memory_ops`]
    pub log_memory_ops: Option<bool>,
    /// New value for [`DebugSettings::max_log_entries`]
    pub max_log_entries: Option<usize>,
}

impl DebugConfigUpdate
{
    /// Whether the update changes nothing (a pure query)
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        *self == Self::default()
    }

    /// Set a single option by its operator-facing name (`logCalls`, `maxLogEntries`, ...).
    ///
    /// ## Errors
    ///
    /// Returns a description when the key is unknown or the value has the
    /// wrong shape.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String>
    {
        let flag = || {
            value
                .parse::<bool>()
                .map_err(|_| format!("{key} expects true or false, got '{value}'"))
        };
        match key {
            "enabled" => self.enabled = Some(flag()?),
            "logCalls" => self.log_calls = Some(flag()?),
            "logParameters" => self.log_parameters = Some(flag()?),
            "logReturnValues" => self.log_return_values = Some(flag()?),
            "logMemoryOps" => self.log_memory_ops = Some(flag()?),
            "maxLogEntries" => {
                self.max_log_entries = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("maxLogEntries expects a positive integer, got '{value}'"))?,
                );
            }
            _ => return Err(format!("unknown debug option '{key}'")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_apply_only_touches_set_fields()
    {
        let mut settings = DebugSettings::default();
        settings.apply(&DebugConfigUpdate {
            log_parameters: Some(false),
            max_log_entries: Some(3),
            ..Default::default()
        });
        assert!(settings.enabled);
        assert!(!settings.log_parameters);
        assert!(settings.log_return_values);
        assert_eq!(settings.max_log_entries, 3);
    }

    #[test]
    fn test_zero_capacity_is_raised()
    {
        let mut settings = DebugSettings::default();
        settings.apply(&DebugConfigUpdate {
            max_log_entries: Some(0),
            ..Default::default()
        });
        assert_eq!(settings.max_log_entries, 1);
    }

    #[test]
    fn test_set_by_name()
    {
        let mut update = DebugConfigUpdate::default();
        assert!(update.is_empty());
        update.set("logMemoryOps", "false").unwrap();
        update.set("maxLogEntries", "25").unwrap();
        assert_eq!(update.log_memory_ops, Some(false));
        assert_eq!(update.max_log_entries, Some(25));
        assert!(update.set("logCalls", "maybe").is_err());
        assert!(update.set("colour", "true").is_err());
    }
}
