//! Configuration types for the agent service.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Task scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Shared state persistence settings.
    pub state: StateConfig,
    /// Host service settings.
    pub service: ServiceConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Task scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on a single loop wait, in seconds.
    ///
    /// The loop re-evaluates its queues at least this often even when
    /// nothing wakes it.
    pub max_wait_secs: u64,
    /// Delay used when a submitted delay is not a non-negative whole
    /// number of seconds.
    pub default_delay_secs: u64,
    /// Whether to submit the built-in task record sweep.
    pub run_maintenance: bool,
    /// Period of the task record sweep, in seconds.
    pub maintenance_period_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: 10,
            default_delay_secs: 10,
            run_maintenance: true,
            maintenance_period_secs: 600,
        }
    }
}

/// Shared state persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// JSON file the state snapshot is written to (None = no persistence).
    pub states_file: Option<PathBuf>,
    /// Seconds between periodic snapshot writes.
    pub save_interval_secs: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            states_file: None,
            save_interval_secs: 60,
        }
    }
}

/// Host service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name reported in the state store and logs.
    pub name: String,
    /// Seconds between heartbeat collections.
    pub heartbeat_interval_secs: u64,
    /// Seconds between status reports.
    pub status_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "homeagent".to_owned(),
            heartbeat_interval_secs: 10,
            status_interval_secs: 60,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily-rotated log files (None = console only).
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            log_dir: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AgentError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AgentError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/homeagent/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("homeagent").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("homeagent")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/homeagent-config/config.toml")
        }
    }

    /// Reject settings that would make the loop spin or a periodic task
    /// fire on every iteration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("scheduler.max_wait_secs", self.scheduler.max_wait_secs),
            (
                "scheduler.maintenance_period_secs",
                self.scheduler.maintenance_period_secs,
            ),
            ("state.save_interval_secs", self.state.save_interval_secs),
            (
                "service.heartbeat_interval_secs",
                self.service.heartbeat_interval_secs,
            ),
            (
                "service.status_interval_secs",
                self.service.status_interval_secs,
            ),
        ];
        for (field, value) in periods {
            if value == 0 {
                return Err(AgentError::Config(format!("{field} must be greater than 0")));
            }
        }
        Ok(())
    }
}
