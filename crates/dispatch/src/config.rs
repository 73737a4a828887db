//! Dispatcher configuration

use lightbus_core::{ConfigError, LightbusConfig, DEFAULT_MAX_CHAIN_LEN, DEFAULT_MAX_OUTSTANDING};
use lightbus_pool::{DEFAULT_REAP_INTERVAL, DEFAULT_REAP_TTL};
use std::path::Path;
use std::time::Duration;

/// Runtime settings for a [`Dispatcher`](crate::Dispatcher).
///
/// Built programmatically with the `with_*` setters, or loaded from a
/// `lightbus.toml` through [`DispatcherConfig::from_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Jobs reserved per adapter for `register_default`
    pub default_max_outstanding: usize,
    /// Longest message list accepted in one transfer
    pub max_chain_len: usize,
    /// Idle job nodes older than this are reclaimed
    pub reap_ttl: Duration,
    /// How often an adapter's reaper wakes up
    pub reap_interval: Duration,
    /// Initial capacity of each adapter queue
    pub queue_capacity_hint: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_max_outstanding: DEFAULT_MAX_OUTSTANDING,
            max_chain_len: DEFAULT_MAX_CHAIN_LEN,
            reap_ttl: DEFAULT_REAP_TTL,
            reap_interval: DEFAULT_REAP_INTERVAL,
            queue_capacity_hint: 32,
        }
    }
}

impl DispatcherConfig {
    /// Set the per-adapter default reservation (builder pattern).
    pub fn with_default_max_outstanding(mut self, n: usize) -> Self {
        self.default_max_outstanding = n;
        self
    }

    /// Set the chain length limit (builder pattern).
    pub fn with_max_chain_len(mut self, n: usize) -> Self {
        self.max_chain_len = n;
        self
    }

    /// Set the reaper TTL (builder pattern).
    pub fn with_reap_ttl(mut self, ttl: Duration) -> Self {
        self.reap_ttl = ttl;
        self
    }

    /// Set the reaper wake-up period (builder pattern).
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Set the queue capacity hint (builder pattern).
    pub fn with_queue_capacity_hint(mut self, n: usize) -> Self {
        self.queue_capacity_hint = n;
        self
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
        if self.reap_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "reap_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a `lightbus.toml`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = LightbusConfig::from_file(path)?;
        Ok(Self::from(&file))
    }
}

impl From<&LightbusConfig> for DispatcherConfig {
    fn from(file: &LightbusConfig) -> Self {
        Self {
            default_max_outstanding: file.default_max_outstanding,
            max_chain_len: file.max_chain_len,
            reap_ttl: file.reap_ttl(),
            reap_interval: file.reap_interval(),
            queue_capacity_hint: file.queue_capacity_hint,
        }
    }
}
