//! Bus-level error types
//!
//! `BusError` is what a protocol implementation returns from a read or write.
//! The engine never interprets or retries it; it is handed back to the caller
//! verbatim, either as the synchronous return value or through the completion
//! of an asynchronous transfer.

use crate::message::MessageKind;
use thiserror::Error;

/// Result type alias for protocol primitives
pub type BusResult<T> = std::result::Result<T, BusError>;

/// Malformed message, detected before touching hardware
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Payload exceeds the fixed block size
    #[error("payload of {len} bytes exceeds block size {max}")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Allowed maximum
        max: usize,
    },

    /// Payload length does not match what the message kind requires
    #[error("{kind:?} needs {expected} payload bytes, got {actual}")]
    LengthMismatch {
        /// Message kind
        kind: MessageKind,
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },
}

/// Failure reported by a bus protocol
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Device did not acknowledge its address
    #[error("no acknowledgement from address {address:#04x}")]
    Nack {
        /// Address that failed to respond
        address: u16,
    },

    /// Adapter gave up waiting for the bus
    #[error("bus timeout")]
    Timeout,

    /// Another master won arbitration
    #[error("bus arbitration lost")]
    ArbitrationLost,

    /// Fewer bytes moved than requested
    #[error("short transfer: expected {expected} bytes, moved {actual}")]
    ShortTransfer {
        /// Bytes requested
        expected: usize,
        /// Bytes actually transferred
        actual: usize,
    },

    /// Adapter cannot perform this kind of operation
    #[error("{0:?} transfers are not supported by this adapter")]
    Unsupported(MessageKind),

    /// Message rejected by the protocol layer
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] MessageError),

    /// Raw adapter status code, passed through untouched
    #[error("adapter error {0}")]
    Errno(i32),
}

impl BusError {
    /// Negative errno-style status code for this error.
    pub fn code(&self) -> i32 {
        match self {
            BusError::Nack { .. } => -6,
            BusError::Timeout => -110,
            BusError::ArbitrationLost => -11,
            BusError::ShortTransfer { .. } => -5,
            BusError::Unsupported(_) => -95,
            BusError::InvalidMessage(_) => -22,
            BusError::Errno(code) => *code,
        }
    }
}
