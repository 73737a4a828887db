//! Core types shared by the lightbus engine
//!
//! This crate defines the vocabulary every other layer speaks:
//! - ProtocolTag / AdapterId / ClientId: who a transaction is addressed to
//! - Message: one protocol operation (kind, direction, command, payload)
//! - BusError: failures surfaced verbatim by a protocol implementation
//! - Limits: fixed payload and chain bounds
//! - LightbusConfig: the `lightbus.toml` file configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod limits;
pub mod message;
pub mod types;

pub use config::{ConfigError, LightbusConfig, CONFIG_FILE_NAME};
pub use error::{BusError, BusResult, MessageError};
pub use limits::{DEFAULT_MAX_CHAIN_LEN, DEFAULT_MAX_OUTSTANDING, MAX_BLOCK_SIZE, SMBUS_BLOCK_MAX};
pub use message::{Direction, Message, MessageKind, Payload};
pub use types::{AdapterId, ClientId, ProtocolTag};
