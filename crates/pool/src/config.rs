//! Pool configuration.

use std::time::Duration;

/// Idle nodes older than this are reclaimed by the reaper.
pub const DEFAULT_REAP_TTL: Duration = Duration::from_secs(5);

/// How often the reaper wakes up to purge.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Pool configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Nodes kept reserved even when idle (default: 0).
    pub min_count: usize,

    /// Hard cap on nodes; allocation beyond it fails (default: unbounded).
    pub max_count: Option<usize>,

    /// Idle age after which the reaper reclaims a node.
    pub reap_ttl: Duration,

    /// Reaper wake-up period.
    pub reap_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_count: 0,
            max_count: None,
            reap_ttl: DEFAULT_REAP_TTL,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

impl PoolConfig {
    /// Create a configuration reserving `min_count` nodes.
    pub fn new(min_count: usize) -> Self {
        PoolConfig {
            min_count,
            ..Self::default()
        }
    }

    /// Set the node cap (builder pattern).
    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
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

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), PoolConfigError> {
        if let Some(max) = self.max_count {
            if max == 0 {
                return Err(PoolConfigError::ZeroMaxCount);
            }
            if self.min_count > max {
                return Err(PoolConfigError::MinExceedsMax {
                    min: self.min_count,
                    max,
                });
            }
        }
        if self.reap_interval.is_zero() {
            return Err(PoolConfigError::ZeroReapInterval);
        }
        Ok(())
    }
}

/// Pool configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolConfigError {
    /// Reserved count is above the cap.
    #[error("min_count {min} exceeds max_count {max}")]
    MinExceedsMax {
        /// Requested minimum
        min: usize,
        /// Configured cap
        max: usize,
    },

    /// A cap of zero nodes can never allocate.
    #[error("max_count must be at least 1")]
    ZeroMaxCount,

    /// The reaper would spin.
    #[error("reap interval must be non-zero")]
    ZeroReapInterval,
}
