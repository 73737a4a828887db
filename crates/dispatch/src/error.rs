//! Dispatcher error types
//!
//! One enum covers every outcome a caller can observe:
//! - rejected input (`InvalidArgument`, `UnknownProtocol`)
//! - resource exhaustion (`Pool`, `QueueCancelled`)
//! - bus failures (`Protocol`, `Attach`), surfaced verbatim from the protocol
//! - `Cancelled`, delivered to completions whose adapter was torn down first

use lightbus_core::{BusError, ConfigError, Message, ProtocolTag};
use lightbus_pool::PoolError;
use lightbus_queue::QueueError;
use thiserror::Error;

/// Result type for dispatcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before any side effect
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No protocol registered for the client's tag
    #[error("no protocol registered for {0}")]
    UnknownProtocol(ProtocolTag),

    /// Job pool failure (exhaustion, shutdown, bookkeeping)
    #[error("job pool: {0}")]
    Pool(#[from] PoolError),

    /// The adapter's queue no longer accepts work
    #[error("adapter queue '{0}' is shut down")]
    QueueCancelled(String),

    /// Other queue failure
    #[error("adapter queue: {0}")]
    Queue(QueueError),

    /// The protocol refused to attach to the adapter
    #[error("attaching {protocol} adapter {adapter} failed: {source}")]
    Attach {
        /// Protocol tag
        protocol: ProtocolTag,
        /// Adapter identity
        adapter: u64,
        /// Protocol error
        source: BusError,
    },

    /// A message in the chain failed; the rest were not executed
    #[error("message {index} failed: {source}")]
    Protocol {
        /// Position of the failing message
        index: usize,
        /// The failing message as it stood when the bus rejected it
        message: Box<Message>,
        /// Protocol error
        source: BusError,
    },

    /// The adapter was torn down before the transfer ran
    #[error("transfer cancelled before it ran")]
    Cancelled,

    /// Configuration could not be loaded or is out of range
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<QueueError> for Error {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Cancelled(name) => Error::QueueCancelled(name),
            other => Error::Queue(other),
        }
    }
}

impl Error {
    /// Errno-style status code for callers that report integers
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) | Error::UnknownProtocol(_) | Error::Config(_) => -22,
            Error::Pool(PoolError::Exiting(_)) | Error::QueueCancelled(_) => -108,
            Error::Pool(_) => -12,
            Error::Queue(_) => -11,
            Error::Attach { source, .. } | Error::Protocol { source, .. } => source.code(),
            Error::Cancelled => -125,
        }
    }

    /// Whether this is the teardown cancellation status
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Index of the failing message, for protocol failures
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            Error::Protocol { index, .. } => Some(*index),
            _ => None,
        }
    }
}
