//! Configuration for the DR engine and drctl.
//!
//! Loads settings from /etc/drctl/config.toml or uses defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::DrError;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/drctl/config.toml";

/// Remote task polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Delay between polls of a running remote task
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up on a remote task after this long
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    500
}

fn default_task_timeout() -> u64 {
    600
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            task_timeout_secs: default_task_timeout(),
        }
    }
}

impl TaskConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// What happens after all waves finish
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StartConfig {
    /// Power on recovered objects once every wave has finished
    #[serde(default)]
    pub start_after_recovery: bool,

    /// Start recovered objects paused instead of running
    #[serde(default)]
    pub start_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrConfig {
    #[serde(default)]
    pub task: TaskConfig,

    #[serde(default)]
    pub start: StartConfig,

    /// Where applied fixes are recorded for later unwinding
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("/var/lib/drctl/ledger.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DrConfig {
    fn default() -> Self {
        Self {
            task: TaskConfig::default(),
            start: StartConfig::default(),
            ledger_path: default_ledger_path(),
            log_level: default_log_level(),
        }
    }
}

impl DrConfig {
    /// Load from the system path, falling back to defaults
    pub fn load() -> Self {
        Self::load_from_path(Path::new(CONFIG_PATH)).unwrap_or_else(|e| {
            warn!("Config not found, using defaults: {}", e);
            DrConfig::default()
        })
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self, DrError> {
        let content = fs::read_to_string(path)?;
        let config: DrConfig = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, DrError> {
        toml::to_string_pretty(self).map_err(|e| DrError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: DrConfig = toml::from_str("[start]\nstart_after_recovery = true\n").unwrap();
        assert!(config.start.start_after_recovery);
        assert!(!config.start.start_paused);
        assert_eq!(config.task.poll_interval_ms, 500);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = DrConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: DrConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
