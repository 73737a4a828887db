//! Transaction dispatcher for serialized hardware buses
//!
//! Clients address one physical adapter each, identified by protocol tag and
//! adapter id. All clients on an adapter share one context:
//! - a [`JobQueue`](lightbus_queue::JobQueue) whose single worker runs async
//!   transfers in submission order
//! - a job pool holding [`TransactionJob`] nodes for message chains
//! - a bus lock serializing the worker against blocking callers
//!
//! Bus access itself goes through a [`BusProtocol`] looked up in a
//! [`ProtocolTable`]. [`SmbusProtocol`] and [`BulkProtocol`] adapt driver
//! traits for register-style and packet-style buses.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bulk;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod pending;
pub mod protocol;
pub mod smbus;


pub use bulk::{BulkProtocol, BulkTransport};
pub use config::DispatcherConfig;
pub use context::{AdapterKey, AdapterStats, BusCounters};
pub use dispatcher::{ClientHandle, Dispatcher, DispatcherBuilder};
pub use error::{Error, Result};
pub use job::{Completion, TransactionJob};
pub use pending::PendingTransfer;
pub use protocol::{BusProtocol, ProtocolTable};
pub use smbus::{SmbusAdapter, SmbusProtocol};
