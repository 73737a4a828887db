//! Queue error types

use crate::job::Job;
use std::fmt;
use thiserror::Error;

/// Errors from queue control operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue has been destroyed
    #[error("job queue '{0}' is cancelled")]
    Cancelled(String),

    /// `resume()` without a matching `pause()`
    #[error("job queue '{0}' is not paused")]
    NotPaused(String),

    /// `pause()` or `drain()` from the queue's own worker would wait for itself
    #[error("job queue '{0}' cannot be waited on from its own worker")]
    FromWorker(String),

    /// The worker thread could not be started
    #[error("failed to spawn worker for job queue '{queue}': {reason}")]
    Spawn {
        /// Queue name
        queue: String,
        /// OS error text
        reason: String,
    },
}

/// Enqueue rejected because the queue is cancelled.
///
/// Carries the job back so the caller can release what it owns.
#[derive(Error)]
#[error("job queue '{queue}' is cancelled, job rejected")]
pub struct EnqueueError {
    /// Queue name
    pub queue: String,
    job: Box<dyn Job>,
}

impl EnqueueError {
    pub(crate) fn new(queue: &str, job: Box<dyn Job>) -> Self {
        Self {
            queue: queue.to_string(),
            job,
        }
    }

    /// Take back the rejected job
    pub fn into_job(self) -> Box<dyn Job> {
        self.job
    }
}

impl fmt::Debug for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnqueueError")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
