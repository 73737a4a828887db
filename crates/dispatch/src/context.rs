//! Adapter contexts
//!
//! One context per physical adapter, keyed by (protocol, adapter id). It owns
//! the adapter's job queue and, through [`AdapterBus`], its job pool, bus lock
//! and protocol. Queued chains hold the bus part only, so a context never
//! sits in a reference cycle with its own queue.

use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::job::TransactionJob;
use crate::protocol::{execute_message, BusProtocol};
use lightbus_core::{AdapterId, ClientId, Message, ProtocolTag};
use lightbus_pool::{PoolConfig, PoolHandle, PoolNode, PoolRegistry, PoolStats};
use lightbus_queue::{JobQueue, QueueStats};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Adapter identity: protocol tag plus physical adapter
pub type AdapterKey = (ProtocolTag, AdapterId);

/// Counters kept per adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusCounters {
    /// Blocking transfers executed
    pub sync_transfers: u64,
    /// Async chains that ran to completion
    pub completed_chains: u64,
    /// Async chains stopped by a protocol error
    pub failed_chains: u64,
    /// Async chains cancelled before they ran
    pub cancelled_chains: u64,
    /// Chains whose freed-node count did not match their length
    pub free_mismatches: u64,
}

/// Snapshot of one adapter context
#[derive(Debug, Clone)]
pub struct AdapterStats {
    /// Protocol tag
    pub protocol: ProtocolTag,
    /// Physical adapter
    pub adapter: AdapterId,
    /// Registered clients
    pub clients: usize,
    /// Current job reservation
    pub max_outstanding: usize,
    /// Queue snapshot
    pub queue: QueueStats,
    /// Job pool snapshot
    pub pool: PoolStats,
    /// Transfer counters
    pub counters: BusCounters,
}

/// The part of a context that executing chains need
pub(crate) struct AdapterBus {
    key: AdapterKey,
    protocol: Arc<dyn BusProtocol>,
    pub(crate) pool: PoolHandle<TransactionJob>,
    /// Serializes hardware access between the worker and sync callers
    lock: Mutex<()>,
    sync_transfers: AtomicU64,
    completed_chains: AtomicU64,
    failed_chains: AtomicU64,
    cancelled_chains: AtomicU64,
    free_mismatches: AtomicU64,
}

impl AdapterBus {
    pub(crate) fn new(
        key: AdapterKey,
        protocol: Arc<dyn BusProtocol>,
        pool: PoolHandle<TransactionJob>,
    ) -> Self {
        Self {
            key,
            protocol,
            pool,
            lock: Mutex::new(()),
            sync_transfers: AtomicU64::new(0),
            completed_chains: AtomicU64::new(0),
            failed_chains: AtomicU64::new(0),
            cancelled_chains: AtomicU64::new(0),
            free_mismatches: AtomicU64::new(0),
        }
    }

    pub(crate) fn label(&self) -> String {
        format!("{}-{}", self.key.0, self.key.1)
    }

    /// Execute caller-owned messages in place, stopping at the first error
    pub(crate) fn run_direct(&self, client: &ClientId, messages: &mut [Message]) -> Result<()> {
        let _bus = self.lock.lock();
        self.sync_transfers.fetch_add(1, Ordering::Relaxed);
        for (index, message) in messages.iter_mut().enumerate() {
            if let Err(source) = execute_message(self.protocol.as_ref(), client, message) {
                warn!(target: "lightbus::dispatch", client = %client, index, error = %source, "Transfer stopped");
                return Err(Error::Protocol {
                    index,
                    message: Box::new(message.clone()),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Execute a pooled chain, stopping at the first error
    pub(crate) fn run_chain(
        &self,
        client: &ClientId,
        nodes: &mut [PoolNode<TransactionJob>],
    ) -> Result<Vec<Message>> {
        let _bus = self.lock.lock();
        for (index, node) in nodes.iter_mut().enumerate() {
            if let Err(source) = execute_message(self.protocol.as_ref(), client, &mut node.message) {
                warn!(target: "lightbus::dispatch", client = %client, index, error = %source, "Chain stopped");
                self.failed_chains.fetch_add(1, Ordering::Relaxed);
                return Err(Error::Protocol {
                    index,
                    message: Box::new(node.message.clone()),
                    source,
                });
            }
        }
        self.completed_chains.fetch_add(1, Ordering::Relaxed);
        Ok(nodes.iter().map(|node| node.message.clone()).collect())
    }

    pub(crate) fn note_cancelled(&self) {
        self.cancelled_chains.fetch_add(1, Ordering::Relaxed);
    }

    /// Return chain nodes to the pool.
    ///
    /// With `expected`, a freed count that differs is an internal
    /// consistency error.
    pub(crate) fn release(&self, nodes: Vec<PoolNode<TransactionJob>>, expected: Option<usize>) {
        let mut freed = 0usize;
        for mut node in nodes {
            node.next = None;
            node.client = None;
            node.completion = None;
            match self.pool.free(node) {
                Ok(()) => freed += 1,
                Err(e) => {
                    error!(target: "lightbus::dispatch", adapter = %self.label(), error = %e, "Chain node rejected by pool")
                }
            }
        }
        if let Some(expected) = expected {
            if freed != expected {
                error!(
                    target: "lightbus::dispatch",
                    adapter = %self.label(),
                    expected,
                    freed,
                    "Freed node count does not match chain length"
                );
                self.free_mismatches.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> BusCounters {
        BusCounters {
            sync_transfers: self.sync_transfers.load(Ordering::Relaxed),
            completed_chains: self.completed_chains.load(Ordering::Relaxed),
            failed_chains: self.failed_chains.load(Ordering::Relaxed),
            cancelled_chains: self.cancelled_chains.load(Ordering::Relaxed),
            free_mismatches: self.free_mismatches.load(Ordering::Relaxed),
        }
    }
}

/// Per-adapter state shared by every client on the adapter
pub(crate) struct AdapterContext {
    key: AdapterKey,
    pub(crate) bus: Arc<AdapterBus>,
    pub(crate) queue: JobQueue,
    /// Modified only under the dispatcher's map entry lock
    clients: AtomicUsize,
    max_outstanding: AtomicUsize,
    /// Set under the map entry lock when the last client leaves. The context
    /// stays in the map, blocking a reopen, until teardown has finished.
    closing: AtomicBool,
    teardown_started: AtomicBool,
    torn_down: Mutex<bool>,
    teardown_done: Condvar,
}

impl AdapterContext {
    /// Attach the protocol and build the pool and queue for a new adapter
    pub(crate) fn open(
        key: AdapterKey,
        protocol: Arc<dyn BusProtocol>,
        max_outstanding: usize,
        config: &DispatcherConfig,
        pools: &PoolRegistry,
    ) -> Result<Self> {
        let (tag, adapter) = key;
        protocol.attach(adapter).map_err(|source| Error::Attach {
            protocol: tag,
            adapter: adapter.0,
            source,
        })?;

        let built = Self::build(key, Arc::clone(&protocol), max_outstanding, config, pools);
        if built.is_err() {
            protocol.detach(adapter);
        }
        built
    }

    fn build(
        key: AdapterKey,
        protocol: Arc<dyn BusProtocol>,
        max_outstanding: usize,
        config: &DispatcherConfig,
        pools: &PoolRegistry,
    ) -> Result<Self> {
        let label = format!("{}-{}", key.0, key.1);
        let pool_config = PoolConfig::new(max_outstanding)
            .with_reap_ttl(config.reap_ttl)
            .with_reap_interval(config.reap_interval);
        let pool = pools.create::<TransactionJob>(&format!("{}-jobs", label), pool_config)?;
        let queue = JobQueue::new(label.clone(), config.queue_capacity_hint)?;

        info!(target: "lightbus::dispatch", adapter = %label, max_outstanding, "Adapter context created");

        Ok(Self {
            key,
            bus: Arc::new(AdapterBus::new(key, protocol, pool)),
            queue,
            clients: AtomicUsize::new(1),
            max_outstanding: AtomicUsize::new(max_outstanding),
            closing: AtomicBool::new(false),
            teardown_started: AtomicBool::new(false),
            torn_down: Mutex::new(false),
            teardown_done: Condvar::new(),
        })
    }

    pub(crate) fn key(&self) -> AdapterKey {
        self.key
    }

    /// Count another client, growing the pool reservation if it asks for more
    pub(crate) fn add_client(&self, max_outstanding: usize) -> Result<()> {
        let current = self.max_outstanding.load(Ordering::Acquire);
        if max_outstanding > current {
            self.bus.pool.resize(max_outstanding)?;
            self.max_outstanding.store(max_outstanding, Ordering::Release);
            info!(
                target: "lightbus::dispatch",
                adapter = %self.bus.label(),
                from = current,
                to = max_outstanding,
                "Adapter reservation grown"
            );
        }
        self.clients.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Drop one client; returns how many remain
    pub(crate) fn release_client(&self) -> usize {
        let prev = self.clients.fetch_sub(1, Ordering::AcqRel);
        prev.saturating_sub(1)
    }

    /// No clients left; teardown is pending or under way
    pub(crate) fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Cancel queued work, stop the worker and detach the protocol.
    ///
    /// Chains still queued receive `Error::Cancelled`. A running chain
    /// finishes first. Runs once.
    pub(crate) fn close(&self) {
        self.mark_closing();
        if self.teardown_started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.destroy();
        self.bus.protocol.detach(self.key.1);

        *self.torn_down.lock() = true;
        self.teardown_done.notify_all();
        info!(target: "lightbus::dispatch", adapter = %self.bus.label(), "Adapter context closed");
    }

    /// Block until `close` has detached the adapter.
    ///
    /// From this context's own worker the wait could never end, so it fails
    /// with `QueueCancelled` instead.
    pub(crate) fn wait_closed(&self) -> Result<()> {
        let mut torn_down = self.torn_down.lock();
        if !*torn_down && self.queue.is_worker_thread() {
            return Err(Error::QueueCancelled(self.queue.name().to_string()));
        }
        if !*torn_down {
            debug!(target: "lightbus::dispatch", adapter = %self.bus.label(), "Waiting for adapter teardown");
        }
        while !*torn_down {
            self.teardown_done.wait(&mut torn_down);
        }
        Ok(())
    }

    pub(crate) fn stats(&self) -> AdapterStats {
        AdapterStats {
            protocol: self.key.0,
            adapter: self.key.1,
            clients: self.clients.load(Ordering::Acquire),
            max_outstanding: self.max_outstanding.load(Ordering::Acquire),
            queue: self.queue.stats(),
            pool: self.bus.pool.stats(),
            counters: self.bus.snapshot(),
        }
    }
}
