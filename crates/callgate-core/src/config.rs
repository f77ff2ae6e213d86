//! Session configuration.
//!
//! ## Environment Variables
//!
//! - `CALLGATE_MAX_LOG_ENTRIES`: ring buffer capacity per log category
//! - `CALLGATE_CALL_TIMEOUT_MS`: wait limit for context-switched calls
//! - `CALLGATE_REGISTRY_PATH`: default file for `save`/`load`

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::settings::DebugSettings;

/// Default wait limit for context-switched calls
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default file used by `save` and `load` when no path is given
pub const DEFAULT_REGISTRY_PATH: &str = "callgate_functions.txt";

/// Everything a [`crate::Session`] needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig
{
    /// Initial operation log settings
    pub debug: DebugSettings,
    /// How long a context-switched call is waited for
    pub call_timeout: Duration,
    /// File used by `save`/`load` when no path is given
    pub registry_path: PathBuf,
}

impl Default for SessionConfig
{
    fn default() -> Self
    {
        Self {
            debug: DebugSettings::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
        }
    }
}

impl SessionConfig
{
    /// Defaults, overridden by any `CALLGATE_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self
    {
        let mut config = Self::default();
        if let Some(max) = env_value::<usize>("CALLGATE_MAX_LOG_ENTRIES") {
            config.debug.max_log_entries = max.max(1);
        }
        if let Some(ms) = env_value::<u64>("CALLGATE_CALL_TIMEOUT_MS") {
            config.call_timeout = Duration::from_millis(ms);
        }
        if let Ok(path) = env::var("CALLGATE_REGISTRY_PATH") {
            if !path.trim().is_empty() {
                config.registry_path = PathBuf::from(path);
            }
        }
        config
    }
}

fn env_value<T: FromStr>(name: &str) -> Option<T>
{
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring invalid environment value");
            None
        }
    }
}
