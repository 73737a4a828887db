//! Job records

/// Why a job's callback is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The worker picked the job up; do the work
    Running,
    /// The queue was destroyed before the job started; do not touch hardware
    Cancelled,
}

/// A unit of work owned by the queue until its callback runs.
///
/// `execute` is called exactly once, either with `Running` from the worker
/// or with `Cancelled` when the queue shuts down first.
pub trait Job: Send + 'static {
    /// Run (or abandon) the job
    fn execute(self: Box<Self>, status: JobStatus);
}

impl<F> Job for F
where
    F: FnOnce(JobStatus) + Send + 'static,
{
    fn execute(self: Box<Self>, status: JobStatus) {
        (*self)(status)
    }
}
