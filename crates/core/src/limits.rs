//! Fixed size limits
//!
//! These bound what a single message or chain may carry. Violations are
//! rejected as invalid arguments before any job is allocated or queued.

/// Maximum payload carried by one message, in bytes.
///
/// Large enough for a full-speed USB interrupt/bulk packet; SMBus block
/// transfers are further limited by [`SMBUS_BLOCK_MAX`].
pub const MAX_BLOCK_SIZE: usize = 64;

/// Maximum payload of an SMBus block read/write.
pub const SMBUS_BLOCK_MAX: usize = 32;

/// Default number of outstanding transaction jobs reserved per adapter.
pub const DEFAULT_MAX_OUTSTANDING: usize = 16;

/// Default upper bound on messages in one transfer.
pub const DEFAULT_MAX_CHAIN_LEN: usize = 64;
