//! Named, reference-counted object pools
//!
//! A pool hands out fixed-size nodes without paying for a fresh allocation on
//! every request. Pools are created through a [`PoolRegistry`]: asking for an
//! existing name with the same element type returns a shared handle, and the
//! pool is torn down when the last handle goes away.
//!
//! # Architecture
//!
//! - Idle nodes live in a list ordered oldest-first; `alloc` takes the newest
//!   (LIFO) so the reaper only ever scans the front.
//! - Every node carries a head guard (in-use / free) and a tail guard. `free`
//!   checks both, so double frees and overruns are reported instead of
//!   silently corrupting the idle list.
//! - Once a pool grows past its minimum, a reaper thread purges nodes that
//!   stayed idle longer than the configured TTL, then stops when the pool is
//!   back at its minimum.
//!
//! Pool lists are guarded by the pool's own lock and never wait on anything
//! else, so allocation is never blocked by bus I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod node;
pub mod pool;
mod reaper;
pub mod registry;

pub use config::{PoolConfig, PoolConfigError, DEFAULT_REAP_INTERVAL, DEFAULT_REAP_TTL};
pub use error::{PoolError, Result};
pub use node::{GuardState, PoolNode};
pub use pool::{element_size_of, ObjectPool, PoolLifecycle, PoolStats};
pub use registry::{PoolHandle, PoolRegistry};
