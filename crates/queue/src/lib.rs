//! Single-worker FIFO job queue
//!
//! One queue serializes all work against one hardware adapter:
//! - a single worker thread runs jobs strictly in enqueue order
//! - `pause()` blocks the caller until the worker reaches a job boundary,
//!   giving synchronous callers exclusive access to the bus
//! - `destroy()` cancels the queue; jobs that never started are still
//!   delivered to their callback, with [`JobStatus::Cancelled`]
//!
//! The queue knows nothing about what a job does; jobs are caller-supplied
//! records implementing [`Job`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod job;
pub mod queue;

pub use error::{EnqueueError, QueueError};
pub use job::{Job, JobStatus};
pub use queue::{JobQueue, PauseGuard, QueueState, QueueStats};
