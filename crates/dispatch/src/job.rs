//! Pooled transaction jobs
//!
//! An async transfer of M messages becomes M `TransactionJob` nodes from the
//! adapter's pool, linked head to tail through `next`. Only the head carries
//! the client and the completion. The head is submitted to the queue as one
//! [`ChainJob`]; when it runs (or is cancelled) every node goes back to the
//! pool and the freed count is checked against M.

use crate::context::AdapterBus;
use crate::error::{Error, Result};
use lightbus_core::{ClientId, Message};
use lightbus_pool::PoolNode;
use lightbus_queue::{Job, JobStatus};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace};

/// Completion callback for an async transfer.
///
/// Receives every message of the chain (reads filled in) on success, or the
/// error that stopped it.
pub type Completion = Box<dyn FnOnce(Result<Vec<Message>>) + Send + 'static>;

/// One pooled chain member
#[derive(Default)]
pub struct TransactionJob {
    /// The protocol message this node carries
    pub message: Message,
    /// Next chain member
    pub next: Option<PoolNode<TransactionJob>>,
    /// Client identity, head only
    pub client: Option<ClientId>,
    /// Caller's completion, head only
    pub completion: Option<Completion>,
}

impl TransactionJob {
    fn reset(&mut self) {
        self.next = None;
        self.client = None;
        self.completion = None;
    }
}

/// Allocate and link one node per message.
///
/// On pool failure every node taken so far is returned before the error.
pub(crate) fn build_chain(
    bus: &AdapterBus,
    client: ClientId,
    messages: &[Message],
    completion: Completion,
) -> Result<PoolNode<TransactionJob>> {
    let mut nodes: Vec<PoolNode<TransactionJob>> = Vec::with_capacity(messages.len());
    for message in messages {
        match bus.pool.alloc() {
            Ok(mut node) => {
                node.reset();
                node.message.copy_from(message);
                nodes.push(node);
            }
            Err(e) => {
                bus.release(nodes, None);
                return Err(e.into());
            }
        }
    }

    let mut next = None;
    while let Some(mut node) = nodes.pop() {
        node.next = next;
        next = Some(node);
    }
    let mut head =
        next.ok_or_else(|| Error::InvalidArgument("transfer has no messages".to_string()))?;
    head.client = Some(client);
    head.completion = Some(completion);
    Ok(head)
}

/// Break a chain into its nodes, head first
pub(crate) fn unlink(head: PoolNode<TransactionJob>) -> Vec<PoolNode<TransactionJob>> {
    let mut nodes = Vec::new();
    let mut cursor = Some(head);
    while let Some(mut node) = cursor {
        cursor = node.next.take();
        nodes.push(node);
    }
    nodes
}

/// Queue entry for one chain
pub(crate) struct ChainJob {
    head: PoolNode<TransactionJob>,
    bus: Arc<AdapterBus>,
    chain_len: usize,
}

impl ChainJob {
    pub(crate) fn new(head: PoolNode<TransactionJob>, bus: Arc<AdapterBus>, chain_len: usize) -> Self {
        Self {
            head,
            bus,
            chain_len,
        }
    }
}

impl Job for ChainJob {
    fn execute(self: Box<Self>, status: JobStatus) {
        let ChainJob {
            head,
            bus,
            chain_len,
        } = *self;

        let mut nodes = unlink(head);
        let (client, completion) = match nodes.first_mut() {
            Some(head) => (head.client.take(), head.completion.take()),
            None => (None, None),
        };

        let outcome = match (status, client) {
            (JobStatus::Cancelled, _) => {
                debug!(target: "lightbus::dispatch", adapter = %bus.label(), chain_len, "Chain cancelled before it ran");
                bus.note_cancelled();
                Err(Error::Cancelled)
            }
            (JobStatus::Running, Some(client)) => bus.run_chain(&client, &mut nodes),
            (JobStatus::Running, None) => Err(Error::InvalidArgument(
                "chain head carries no client".to_string(),
            )),
        };
        trace!(target: "lightbus::dispatch", adapter = %bus.label(), ok = outcome.is_ok(), "Chain finished");

        // The completion runs before the nodes go back; a panicking one still
        // releases them and the panic continues to the queue worker.
        let delivered = catch_unwind(AssertUnwindSafe(move || {
            if let Some(completion) = completion {
                completion(outcome);
            }
        }));
        bus.release(nodes, Some(chain_len));
        if let Err(panic) = delivered {
            resume_unwind(panic);
        }
    }
}
