//! Pool error types

use crate::config::PoolConfigError;
use thiserror::Error;

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors returned by pool creation, allocation and free
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A pool with this name exists with a different element size
    #[error("pool '{name}' exists with element size {existing}, requested {requested}")]
    ElementSizeMismatch {
        /// Pool name
        name: String,
        /// Element size of the existing pool
        existing: usize,
        /// Element size asked for
        requested: usize,
    },

    /// Same name and size, but a different element type
    #[error("pool '{name}' holds {existing}, requested {requested}")]
    TypeMismatch {
        /// Pool name
        name: String,
        /// Element type of the existing pool
        existing: &'static str,
        /// Element type asked for
        requested: &'static str,
    },

    /// Destruction has begun; no further allocation
    #[error("pool '{0}' is exiting")]
    Exiting(String),

    /// The node cap has been reached
    #[error("pool '{name}' exhausted at {max} nodes")]
    Exhausted {
        /// Pool name
        name: String,
        /// Configured cap
        max: usize,
    },

    /// The node was already free
    #[error("double free of node {node} in pool '{name}'")]
    DoubleFree {
        /// Pool name
        name: String,
        /// Node id
        node: u64,
    },

    /// The node was allocated by another pool
    #[error("node {node} does not belong to pool '{name}'")]
    ForeignNode {
        /// Pool the node was returned to
        name: String,
        /// Node id
        node: u64,
    },

    /// Pool names must be non-empty
    #[error("pool name must not be empty")]
    InvalidName,

    /// Configuration rejected
    #[error("invalid pool config: {0}")]
    Config(#[from] PoolConfigError),
}
