//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/scopewatch/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/scopewatch/` (~/.config/scopewatch/)
//! - Data: `$XDG_DATA_HOME/scopewatch/` (~/.local/share/scopewatch/)
//! - State/Logs: `$XDG_STATE_HOME/scopewatch/` (~/.local/state/scopewatch/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Identity reported in the `client` field of every sync request
    #[serde(default)]
    pub client: ClientConfig,

    /// Delivery timing and capacity
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Collector processes keyed by host identity
    #[serde(default)]
    pub hosts: HashMap<String, HostConfig>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Client identity sent to the collector
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_client_name")]
    pub name: String,

    #[serde(default = "default_client_version")]
    pub version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
        }
    }
}

fn default_client_name() -> String {
    "scopewatch".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Delivery configuration
///
/// Controls how long a single delivery may wait, how often the queue is
/// retried, how long a report key stays throttled, and how many undelivered
/// reports are kept.
#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    /// Seconds to wait for a matching collector response
    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,

    /// Seconds between periodic queue flushes
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Seconds before the same report key may be sent again
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Maximum number of queued reports (oldest evicted first)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_delivery_timeout(),
            flush_interval_secs: default_flush_interval(),
            cooldown_secs: default_cooldown(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl DeliveryConfig {
    /// Bound on a single request/response exchange
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Period of the retry timer
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Throttle window for a report key
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }
}

/// Largest accepted value for any `delivery.*_secs` setting (ten years)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_delivery_timeout() -> u64 {
    15
}

fn default_flush_interval() -> u64 {
    30 * 60
}

fn default_cooldown() -> u64 {
    7 * 24 * 60 * 60
}

fn default_queue_capacity() -> usize {
    crate::queue::QUEUE_CAP
}

/// How to start the collector process for one host identity
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Executable to spawn
    pub command: PathBuf,

    /// Extra arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.delivery.timeout_secs == 0 {
            return Err(Error::Config(
                "delivery.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.delivery.flush_interval_secs == 0 {
            return Err(Error::Config(
                "delivery.flush_interval_secs must be greater than 0".to_string(),
            ));
        }
        for (name, secs) in [
            ("timeout_secs", self.delivery.timeout_secs),
            ("flush_interval_secs", self.delivery.flush_interval_secs),
            ("cooldown_secs", self.delivery.cooldown_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(Error::Config(format!(
                    "delivery.{} must be at most {} seconds",
                    name, MAX_DURATION_SECS
                )));
            }
        }
        if self.delivery.queue_capacity == 0 {
            return Err(Error::Config(
                "delivery.queue_capacity must be at least 1".to_string(),
            ));
        }
        for (identity, host) in &self.hosts {
            if host.command.as_os_str().is_empty() {
                return Err(Error::Config(format!(
                    "hosts.\"{}\".command must not be empty",
                    identity
                )));
            }
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/scopewatch/config.toml` (~/.config/scopewatch/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("scopewatch").join("config.toml")
    }

    /// Returns the data directory path (for the state database)
    ///
    /// `$XDG_DATA_HOME/scopewatch/` (~/.local/share/scopewatch/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("scopewatch")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/scopewatch/` (~/.local/state/scopewatch/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("scopewatch")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/scopewatch/state.db` (~/.local/share/scopewatch/state.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("state.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/scopewatch/scopewatch.log` (~/.local/state/scopewatch/scopewatch.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("scopewatch.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// CLI binaries call this before anything reads the paths above.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
