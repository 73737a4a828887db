//! The job queue and its worker thread.

use crate::error::{EnqueueError, QueueError};
use crate::job::{Job, JobStatus};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, trace, warn};

/// Queue state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// No job running, waiting for work
    Idle,
    /// The worker is executing a job
    Running,
    /// Held by one or more `pause()` callers; no job is running
    Paused,
    /// Destroyed; no further jobs accepted
    Cancelled,
}

/// Queue metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Queue name
    pub name: String,
    /// Current state
    pub state: QueueState,
    /// Jobs waiting to start
    pub queued: usize,
    /// Outstanding `pause()` calls
    pub pause_holders: usize,
    /// Jobs executed with `Running`
    pub completed: u64,
    /// Jobs delivered with `Cancelled`
    pub cancelled: u64,
    /// Jobs whose callback panicked
    pub panicked: u64,
}

struct QueueCore {
    jobs: VecDeque<Box<dyn Job>>,
    state: QueueState,
    pause_holders: usize,
    completed: u64,
    cancelled: u64,
    panicked: u64,
}

struct QueueInner {
    name: String,
    core: Mutex<QueueCore>,
    /// Worker waits here for jobs, resume or cancel
    work_ready: Condvar,
    /// Pausers and drainers wait here for the worker to reach a boundary
    state_changed: Condvar,
    worker_id: OnceCell<ThreadId>,
}

impl QueueInner {
    fn on_worker(&self) -> bool {
        self.worker_id.get() == Some(&thread::current().id())
    }
}

/// A single-worker FIFO job queue.
///
/// Jobs run one at a time in enqueue order on a dedicated thread named
/// `lightbus-q-{name}`. Dropping the queue destroys it.
pub struct JobQueue {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobQueue {
    /// Create a queue and start its worker.
    ///
    /// `capacity_hint` pre-sizes the pending list; it is not a limit.
    pub fn new(name: impl Into<String>, capacity_hint: usize) -> Result<Self, QueueError> {
        let name = name.into();
        let inner = Arc::new(QueueInner {
            name: name.clone(),
            core: Mutex::new(QueueCore {
                jobs: VecDeque::with_capacity(capacity_hint),
                state: QueueState::Idle,
                pause_holders: 0,
                completed: 0,
                cancelled: 0,
                panicked: 0,
            }),
            work_ready: Condvar::new(),
            state_changed: Condvar::new(),
            worker_id: OnceCell::new(),
        });

        let worker_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(format!("lightbus-q-{}", name))
            .spawn(move || worker_loop(&worker_inner))
            .map_err(|e| QueueError::Spawn {
                queue: name.clone(),
                reason: e.to_string(),
            })?;
        let _ = inner.worker_id.set(handle.thread().id());

        debug!(target: "lightbus::queue", queue = %name, capacity_hint, "Job queue created");

        Ok(Self {
            inner,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current state
    pub fn state(&self) -> QueueState {
        self.inner.core.lock().state
    }

    /// Whether the calling thread is this queue's worker
    pub fn is_worker_thread(&self) -> bool {
        self.inner.on_worker()
    }

    /// Append a job to the tail of the queue.
    ///
    /// Fails only when the queue is cancelled; the job is handed back
    /// inside the error without its callback having run.
    pub fn enqueue(&self, job: Box<dyn Job>) -> Result<(), EnqueueError> {
        let mut core = self.inner.core.lock();
        if core.state == QueueState::Cancelled {
            return Err(EnqueueError::new(&self.inner.name, job));
        }
        core.jobs.push_back(job);
        trace!(target: "lightbus::queue", queue = %self.inner.name, queued = core.jobs.len(), "Job enqueued");

        // Notify under the lock: the worker checks for jobs and waits while
        // holding it, so the wakeup cannot be lost.
        if core.state == QueueState::Idle {
            self.inner.work_ready.notify_one();
        }
        Ok(())
    }

    /// Enqueue a closure
    pub fn submit<F>(&self, work: F) -> Result<(), EnqueueError>
    where
        F: FnOnce(JobStatus) + Send + 'static,
    {
        self.enqueue(Box::new(work))
    }

    /// Stop the queue at the next job boundary.
    ///
    /// Blocks until no job is running. Pauses nest: the queue stays paused
    /// until every `pause()` has been matched by a `resume()`.
    pub fn pause(&self) -> Result<(), QueueError> {
        if self.inner.on_worker() {
            return Err(QueueError::FromWorker(self.inner.name.clone()));
        }

        let mut core = self.inner.core.lock();
        if core.state == QueueState::Cancelled {
            return Err(QueueError::Cancelled(self.inner.name.clone()));
        }
        core.pause_holders += 1;

        match core.state {
            QueueState::Idle => {
                core.state = QueueState::Paused;
                self.inner.state_changed.notify_all();
            }
            QueueState::Running => {
                trace!(target: "lightbus::queue", queue = %self.inner.name, "Waiting for running job before pausing");
                while core.state == QueueState::Running {
                    self.inner.state_changed.wait(&mut core);
                }
            }
            QueueState::Paused | QueueState::Cancelled => {}
        }

        if core.state == QueueState::Cancelled {
            core.pause_holders -= 1;
            return Err(QueueError::Cancelled(self.inner.name.clone()));
        }

        debug!(target: "lightbus::queue", queue = %self.inner.name, holders = core.pause_holders, "Job queue paused");
        Ok(())
    }

    /// Release one `pause()`.
    ///
    /// The worker restarts when the last holder resumes.
    pub fn resume(&self) -> Result<(), QueueError> {
        let mut core = self.inner.core.lock();
        if core.pause_holders == 0 {
            warn!(target: "lightbus::queue", queue = %self.inner.name, "resume() without matching pause()");
            return Err(QueueError::NotPaused(self.inner.name.clone()));
        }
        core.pause_holders -= 1;

        if core.pause_holders == 0 && core.state == QueueState::Paused {
            core.state = if core.jobs.is_empty() {
                QueueState::Idle
            } else {
                QueueState::Running
            };
            self.inner.work_ready.notify_one();
            self.inner.state_changed.notify_all();
            debug!(target: "lightbus::queue", queue = %self.inner.name, "Job queue resumed");
        }
        Ok(())
    }

    /// Pause and return a guard that resumes on drop
    pub fn pause_guard(&self) -> Result<PauseGuard<'_>, QueueError> {
        self.pause()?;
        Ok(PauseGuard { queue: self })
    }

    /// Block until nothing is queued and no job is running.
    ///
    /// Returns immediately on a paused queue with an empty backlog; a paused
    /// queue with pending jobs blocks until it is resumed or destroyed.
    /// A job cannot wait for itself: calling this from the worker fails with
    /// [`QueueError::FromWorker`].
    pub fn drain(&self) -> Result<(), QueueError> {
        if self.inner.on_worker() {
            return Err(QueueError::FromWorker(self.inner.name.clone()));
        }

        let mut core = self.inner.core.lock();
        while core.state == QueueState::Running
            || (!core.jobs.is_empty() && core.state != QueueState::Cancelled)
        {
            self.inner.state_changed.wait(&mut core);
        }
        Ok(())
    }

    /// Cancel the queue and stop the worker.
    ///
    /// A running job finishes normally; every job still queued is delivered
    /// with [`JobStatus::Cancelled`]. Waits for the worker to exit unless
    /// called from the worker itself. Idempotent.
    pub fn destroy(&self) {
        {
            let mut core = self.inner.core.lock();
            if core.state != QueueState::Cancelled {
                debug!(
                    target: "lightbus::queue",
                    queue = %self.inner.name,
                    pending = core.jobs.len(),
                    "Destroying job queue"
                );
                core.state = QueueState::Cancelled;
            }
            self.inner.work_ready.notify_all();
            self.inner.state_changed.notify_all();
        }

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // The worker exits on its own once the current job returns
                trace!(target: "lightbus::queue", queue = %self.inner.name, "Destroy from worker, not joining");
                return;
            }
            if handle.join().is_err() {
                error!(target: "lightbus::queue", queue = %self.inner.name, "Worker thread panicked");
            }
        }
    }

    /// Return a snapshot of queue metrics
    pub fn stats(&self) -> QueueStats {
        let core = self.inner.core.lock();
        QueueStats {
            name: self.inner.name.clone(),
            state: core.state,
            queued: core.jobs.len(),
            pause_holders: core.pause_holders,
            completed: core.completed,
            cancelled: core.cancelled,
            panicked: core.panicked,
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Holds a queue paused; resumes on drop.
#[must_use = "the queue resumes as soon as the guard is dropped"]
pub struct PauseGuard<'a> {
    queue: &'a JobQueue,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        let _ = self.queue.resume();
    }
}

fn worker_loop(inner: &QueueInner) {
    loop {
        let job = {
            let mut core = inner.core.lock();
            loop {
                match core.state {
                    QueueState::Cancelled => {
                        let remaining: Vec<Box<dyn Job>> = core.jobs.drain(..).collect();
                        drop(core);
                        if !remaining.is_empty() {
                            debug!(
                                target: "lightbus::queue",
                                queue = %inner.name,
                                count = remaining.len(),
                                "Delivering cancellation to queued jobs"
                            );
                        }
                        for job in remaining {
                            run_job(inner, job, JobStatus::Cancelled);
                        }
                        return;
                    }
                    QueueState::Paused => inner.work_ready.wait(&mut core),
                    QueueState::Idle | QueueState::Running => {
                        if core.pause_holders > 0 {
                            core.state = QueueState::Paused;
                            inner.state_changed.notify_all();
                            continue;
                        }
                        if let Some(job) = core.jobs.pop_front() {
                            core.state = QueueState::Running;
                            break job;
                        }
                        if core.state != QueueState::Idle {
                            core.state = QueueState::Idle;
                            inner.state_changed.notify_all();
                        }
                        inner.work_ready.wait(&mut core);
                    }
                }
            }
        };

        run_job(inner, job, JobStatus::Running);
    }
}

/// Execute outside the lock. catch_unwind keeps a panicking callback from
/// killing the worker and stranding the rest of the queue.
fn run_job(inner: &QueueInner, job: Box<dyn Job>, status: JobStatus) {
    let outcome = catch_unwind(AssertUnwindSafe(|| job.execute(status)));

    let mut core = inner.core.lock();
    match status {
        JobStatus::Running => core.completed += 1,
        JobStatus::Cancelled => core.cancelled += 1,
    }
    if let Err(e) = outcome {
        core.panicked += 1;
        let msg = e
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| e.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("(non-string panic)");
        error!(target: "lightbus::queue", queue = %inner.name, "job panicked: {}", msg);
    }
}
