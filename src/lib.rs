//! lightbus - transaction engine for slow, serialized hardware buses
//!
//! Lighting controllers hang off I2C/SMBus adapters and USB endpoints that
//! can only run one transaction at a time. lightbus lets any number of
//! callers share such an adapter:
//!
//! - [`ObjectPool`] hands out transaction descriptors without per-transfer
//!   allocation, with guard-word corruption checks and idle reclamation
//! - [`JobQueue`] runs one adapter's work on a single worker, FIFO, with
//!   pause/resume for blocking callers and deterministic cancellation
//! - [`Dispatcher`] maps clients to adapters and executes message lists
//!   either inline or as queued chains
//!
//! # Quick Start
//!
//! ```ignore
//! use lightbus::{ClientId, Dispatcher, Message, SmbusProtocol};
//!
//! let dispatcher = Dispatcher::builder()
//!     .with_protocol(SmbusProtocol::new(host_driver))
//!     .build()?;
//!
//! let led = dispatcher.register(ClientId::i2c(3, 0x27), 4)?;
//!
//! // Blocking
//! let mut msgs = [Message::write_byte_data(0x01, 0xFF)];
//! dispatcher.transfer(&led, &mut msgs)?;
//!
//! // Queued
//! dispatcher.transfer_async(&led, &[Message::write_block(0x10, &rgb)], |outcome| {
//!     if let Err(e) = outcome {
//!         eprintln!("color update failed: {}", e);
//!     }
//! })?;
//! ```

pub use lightbus_core::{
    AdapterId, BusError, BusResult, ClientId, ConfigError, Direction, LightbusConfig, Message,
    MessageError, MessageKind, Payload, ProtocolTag, CONFIG_FILE_NAME, DEFAULT_MAX_CHAIN_LEN,
    DEFAULT_MAX_OUTSTANDING, MAX_BLOCK_SIZE, SMBUS_BLOCK_MAX,
};
pub use lightbus_dispatch::{
    AdapterKey, AdapterStats, BulkProtocol, BulkTransport, BusCounters, BusProtocol, ClientHandle,
    Completion, Dispatcher, DispatcherBuilder, DispatcherConfig, Error, PendingTransfer,
    ProtocolTable, Result, SmbusAdapter, SmbusProtocol, TransactionJob,
};
pub use lightbus_pool::{
    GuardState, ObjectPool, PoolConfig, PoolError, PoolHandle, PoolLifecycle, PoolNode,
    PoolRegistry, PoolStats,
};
pub use lightbus_queue::{
    EnqueueError, Job, JobQueue, JobStatus, PauseGuard, QueueError, QueueState, QueueStats,
};
