//! Promise-style completion for async transfers
//!
//! `Dispatcher::submit` hands back a [`PendingTransfer`] instead of taking a
//! callback. The sending half fills it from the queue worker; if the sender
//! is dropped without an outcome, the transfer resolves as cancelled, so a
//! waiter is never stranded.

use crate::error::{Error, Result};
use lightbus_core::Message;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Slot {
    outcome: Mutex<Option<Result<Vec<Message>>>>,
    ready: Condvar,
}

impl Slot {
    fn fill(&self, outcome: Result<Vec<Message>>) {
        let mut guard = self.outcome.lock();
        if guard.is_none() {
            *guard = Some(outcome);
        }
        self.ready.notify_all();
    }
}

/// The outcome of an async transfer, delivered later
pub struct PendingTransfer {
    slot: Arc<Slot>,
}

/// Writing half of a [`PendingTransfer`]
pub(crate) struct CompletionSender {
    slot: Option<Arc<Slot>>,
}

/// Create a linked promise and sender
pub(crate) fn pending() -> (PendingTransfer, CompletionSender) {
    let slot = Arc::new(Slot {
        outcome: Mutex::new(None),
        ready: Condvar::new(),
    });
    (
        PendingTransfer {
            slot: Arc::clone(&slot),
        },
        CompletionSender { slot: Some(slot) },
    )
}

impl CompletionSender {
    pub(crate) fn complete(mut self, outcome: Result<Vec<Message>>) {
        if let Some(slot) = self.slot.take() {
            slot.fill(outcome);
        }
    }
}

impl Drop for CompletionSender {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.fill(Err(Error::Cancelled));
        }
    }
}

impl PendingTransfer {
    /// Whether the outcome has arrived
    pub fn is_complete(&self) -> bool {
        self.slot.outcome.lock().is_some()
    }

    /// Block until the outcome arrives
    pub fn wait(self) -> Result<Vec<Message>> {
        let mut guard = self.slot.outcome.lock();
        loop {
            if let Some(outcome) = guard.take() {
                return outcome;
            }
            self.slot.ready.wait(&mut guard);
        }
    }

    /// Block up to `timeout`; hands the promise back if nothing arrived
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<Vec<Message>>, Self> {
        let deadline = Instant::now() + timeout;
        {
            let mut guard = self.slot.outcome.lock();
            loop {
                if let Some(outcome) = guard.take() {
                    return Ok(outcome);
                }
                if self.slot.ready.wait_until(&mut guard, deadline).timed_out() {
                    if let Some(outcome) = guard.take() {
                        return Ok(outcome);
                    }
                    break;
                }
            }
        }
        Err(self)
    }
}

impl std::fmt::Debug for PendingTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransfer")
            .field("complete", &self.is_complete())
            .finish()
    }
}
