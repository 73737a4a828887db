//! Engine configuration via `lightbus.toml`
//!
//! All fields are optional in the file; anything missing falls back to the
//! compiled-in defaults. Durations are stored in milliseconds.

use crate::limits::{DEFAULT_MAX_CHAIN_LEN, DEFAULT_MAX_OUTSTANDING};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "lightbus.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("config file '{path}': {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config file '{path}': {message}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Config could not be serialized
    #[error("failed to serialize config: {0}")]
    Serialize(String),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine configuration loaded from `lightbus.toml`.
///
/// # Example
///
/// ```toml
/// default_max_outstanding = 16
/// max_chain_len = 64
/// queue_capacity_hint = 32
/// reap_ttl_ms = 5000
/// reap_interval_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightbusConfig {
    /// Jobs reserved per adapter when a client does not name a count.
    #[serde(default = "default_max_outstanding")]
    pub default_max_outstanding: usize,
    /// Longest message list accepted in one transfer.
    #[serde(default = "default_max_chain_len")]
    pub max_chain_len: usize,
    /// Initial queue capacity per adapter.
    #[serde(default = "default_queue_capacity_hint")]
    pub queue_capacity_hint: usize,
    /// Idle pool nodes older than this are reclaimed by the reaper.
    #[serde(default = "default_reap_ttl_ms")]
    pub reap_ttl_ms: u64,
    /// How often the reaper wakes up.
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
}

fn default_max_outstanding() -> usize {
    DEFAULT_MAX_OUTSTANDING
}

fn default_max_chain_len() -> usize {
    DEFAULT_MAX_CHAIN_LEN
}

fn default_queue_capacity_hint() -> usize {
    32
}

fn default_reap_ttl_ms() -> u64 {
    5_000
}

fn default_reap_interval_ms() -> u64 {
    1_000
}

impl Default for LightbusConfig {
    fn default() -> Self {
        Self {
            default_max_outstanding: default_max_outstanding(),
            max_chain_len: default_max_chain_len(),
            queue_capacity_hint: default_queue_capacity_hint(),
            reap_ttl_ms: default_reap_ttl_ms(),
            reap_interval_ms: default_reap_interval_ms(),
        }
    }
}

impl LightbusConfig {
    /// Reaper TTL as a `Duration`
    pub fn reap_ttl(&self) -> Duration {
        Duration::from_millis(self.reap_ttl_ms)
    }

    /// Reaper wake-up interval as a `Duration`
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_max_outstanding == 0 {
            return Err(ConfigError::Invalid(
                "default_max_outstanding must be at least 1".to_string(),
            ));
        }
        if self.max_chain_len == 0 {
            return Err(ConfigError::Invalid(
                "max_chain_len must be at least 1".to_string(),
            ));
        }
        if self.reap_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reap_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# lightbus engine configuration
#
# Transaction jobs reserved per adapter when a client does not say.
default_max_outstanding = 16

# Longest message list accepted in a single transfer.
max_chain_len = 64

# Initial job queue capacity per adapter.
queue_capacity_hint = 32

# Idle pooled jobs older than this many milliseconds are reclaimed.
reap_ttl_ms = 5000

# How often the pool reaper wakes up, in milliseconds.
reap_interval_ms = 1000
"#
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: LightbusConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
