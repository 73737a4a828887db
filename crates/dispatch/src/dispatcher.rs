//! The transaction dispatcher
//!
//! Maps clients to shared adapter contexts and runs their transfers:
//!
//! - `transfer` (blocking): pause the adapter queue, take the bus lock, run
//!   the caller's own messages in place, resume. No pooled jobs.
//! - `transfer_async`: copy the messages into a pooled chain and enqueue it
//!   as one job; the completion fires later from the adapter's worker.
//! - `submit`: `transfer_async` returning a [`PendingTransfer`].
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = Dispatcher::builder()
//!     .with_protocol(SmbusProtocol::new(host))
//!     .build()?;
//!
//! let rgb = dispatcher.register(ClientId::i2c(3, 0x27), 4)?;
//! let mut msgs = [Message::write_byte_data(0x01, 0xFF), Message::read_byte_data(0x02)];
//! dispatcher.transfer(&rgb, &mut msgs)?;
//!
//! let pending = dispatcher.submit(&rgb, &[Message::write_block(0x10, &colors)])?;
//! pending.wait()?;
//! ```

use crate::config::DispatcherConfig;
use crate::context::{AdapterContext, AdapterKey, AdapterStats};
use crate::error::{Error, Result};
use crate::job::{build_chain, ChainJob};
use crate::pending::{pending, PendingTransfer};
use crate::protocol::{BusProtocol, ProtocolTable};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lightbus_core::{AdapterId, ClientId, Message, ProtocolTag};
use lightbus_pool::PoolRegistry;
use lightbus_queue::{JobStatus, QueueState};
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct DispatcherInner {
    protocols: ProtocolTable,
    config: DispatcherConfig,
    pools: PoolRegistry,
    contexts: DashMap<AdapterKey, Arc<AdapterContext>>,
}

impl DispatcherInner {
    fn validate_messages(&self, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Err(Error::InvalidArgument("transfer has no messages".to_string()));
        }
        if messages.len() > self.config.max_chain_len {
            return Err(Error::InvalidArgument(format!(
                "{} messages exceed the chain limit of {}",
                messages.len(),
                self.config.max_chain_len
            )));
        }
        for (index, message) in messages.iter().enumerate() {
            message
                .validate()
                .map_err(|e| Error::InvalidArgument(format!("message {}: {}", index, e)))?;
        }
        Ok(())
    }

    /// Drop one client; the last one out closes the adapter.
    ///
    /// The closing context keeps its map slot until teardown is complete, so
    /// a concurrent `register` for the same adapter waits instead of
    /// attaching a second context to hardware that is still busy.
    fn release(&self, client: &ClientId, context: &Arc<AdapterContext>) {
        let key = client.adapter_key();
        let last = match self.contexts.entry(key) {
            Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), context) => {
                if context.release_client() == 0 {
                    context.mark_closing();
                    true
                } else {
                    false
                }
            }
            _ => {
                warn!(target: "lightbus::dispatch", client = %client, "Unregister for unknown adapter");
                false
            }
        };
        debug!(target: "lightbus::dispatch", client = %client, "Client unregistered");

        // Closing joins the adapter worker; done outside the map lock
        if last {
            context.close();
            self.contexts
                .remove_if(&key, |_, current| Arc::ptr_eq(current, context));
        }
    }
}

/// Per-adapter transaction dispatcher.
///
/// Cheap to clone; clones share adapter contexts.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Start building a dispatcher
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatcher over `protocols` with default configuration
    pub fn new(protocols: ProtocolTable) -> Result<Self> {
        Self::builder().protocols(protocols).build()
    }

    /// Active configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Registered protocols
    pub fn protocols(&self) -> &ProtocolTable {
        &self.inner.protocols
    }

    /// Register a client, creating its adapter context on first use.
    ///
    /// `max_outstanding` is the number of jobs kept ready in the adapter's
    /// pool. A later client asking for more grows the reservation; asking
    /// for less leaves it alone. If the adapter is still being torn down
    /// after its last client left, this waits for the teardown and then
    /// opens a fresh context.
    pub fn register(&self, client: ClientId, max_outstanding: usize) -> Result<ClientHandle> {
        if max_outstanding == 0 {
            return Err(Error::InvalidArgument(
                "max_outstanding must be at least 1".to_string(),
            ));
        }
        let key = client.adapter_key();
        let protocol = self
            .inner
            .protocols
            .get(key.0)
            .ok_or(Error::UnknownProtocol(key.0))?;

        let context = loop {
            match self.inner.contexts.entry(key) {
                Entry::Occupied(entry) => {
                    let context = Arc::clone(entry.get());
                    if context.is_closing() {
                        // Wait for the old context to let go of the adapter
                        drop(entry);
                        context.wait_closed()?;
                        self.inner
                            .contexts
                            .remove_if(&key, |_, current| Arc::ptr_eq(current, &context));
                        continue;
                    }
                    context.add_client(max_outstanding)?;
                    break context;
                }
                Entry::Vacant(entry) => {
                    let context = Arc::new(AdapterContext::open(
                        key,
                        Arc::clone(&protocol),
                        max_outstanding,
                        &self.inner.config,
                        &self.inner.pools,
                    )?);
                    entry.insert(Arc::clone(&context));
                    break context;
                }
            }
        };
        debug!(target: "lightbus::dispatch", client = %client, max_outstanding, "Client registered");

        Ok(ClientHandle {
            client,
            context,
            owner: Arc::clone(&self.inner),
            active: true,
        })
    }

    /// Register with the configured default reservation
    pub fn register_default(&self, client: ClientId) -> Result<ClientHandle> {
        self.register(client, self.inner.config.default_max_outstanding)
    }

    /// Unregister a client. Equivalent to dropping the handle.
    ///
    /// When the last client on an adapter leaves, queued async transfers are
    /// completed with [`Error::Cancelled`] and the protocol is detached.
    pub fn unregister(&self, handle: ClientHandle) {
        drop(handle);
    }

    fn check_handle(&self, handle: &ClientHandle) -> Result<()> {
        if !Arc::ptr_eq(&handle.owner, &self.inner) {
            return Err(Error::InvalidArgument(format!(
                "client {} is registered with another dispatcher",
                handle.client
            )));
        }
        Ok(())
    }

    /// Run `messages` in order, blocking until done.
    ///
    /// Waits for any in-flight async job on the adapter, then holds the bus
    /// exclusively. Reads are filled in place. Stops at the first failing
    /// message. Calling this from a completion on the same adapter fails
    /// with `Error::Queue` rather than deadlocking.
    pub fn transfer(&self, handle: &ClientHandle, messages: &mut [Message]) -> Result<()> {
        self.check_handle(handle)?;
        self.inner.validate_messages(messages)?;

        let context = &handle.context;
        let _paused = context.queue.pause_guard()?;
        trace!(target: "lightbus::dispatch", client = %handle.client, count = messages.len(), "Sync transfer");
        context.bus.run_direct(&handle.client, messages)
    }

    /// Queue `messages` and return at once.
    ///
    /// `Ok` only means the transfer was accepted. The outcome, including
    /// protocol errors and cancellation, reaches `completion` exactly once.
    pub fn transfer_async<F>(&self, handle: &ClientHandle, messages: &[Message], completion: F) -> Result<()>
    where
        F: FnOnce(Result<Vec<Message>>) + Send + 'static,
    {
        self.check_handle(handle)?;
        self.inner.validate_messages(messages)?;

        let context = &handle.context;
        if context.queue.state() == QueueState::Cancelled {
            return Err(Error::QueueCancelled(context.queue.name().to_string()));
        }

        let head = build_chain(&context.bus, handle.client, messages, Box::new(completion))?;
        let job = ChainJob::new(head, Arc::clone(&context.bus), messages.len());
        if let Err(rejected) = context.queue.enqueue(Box::new(job)) {
            // Torn down after the check above; the completion still hears about it
            warn!(target: "lightbus::dispatch", client = %handle.client, "Adapter closed during submit");
            rejected.into_job().execute(JobStatus::Cancelled);
        }
        trace!(target: "lightbus::dispatch", client = %handle.client, count = messages.len(), "Async transfer queued");
        Ok(())
    }

    /// Queue `messages` and return a promise for the outcome
    pub fn submit(&self, handle: &ClientHandle, messages: &[Message]) -> Result<PendingTransfer> {
        let (promise, sender) = pending();
        self.transfer_async(handle, messages, move |outcome| sender.complete(outcome))?;
        Ok(promise)
    }

    /// Block until the client's adapter has no queued or running jobs.
    ///
    /// Fails with `Error::Queue` when called from a completion running on
    /// that adapter's worker.
    pub fn drain(&self, handle: &ClientHandle) -> Result<()> {
        self.check_handle(handle)?;
        handle.context.queue.drain()?;
        Ok(())
    }

    /// Snapshot of one adapter, if it has registered clients
    pub fn adapter_stats(&self, protocol: ProtocolTag, adapter: AdapterId) -> Option<AdapterStats> {
        self.inner
            .contexts
            .get(&(protocol, adapter))
            .filter(|context| !context.is_closing())
            .map(|context| context.stats())
    }

    /// Adapters with registered clients, sorted
    pub fn adapters(&self) -> Vec<AdapterKey> {
        let mut keys: Vec<AdapterKey> = self
            .inner
            .contexts
            .iter()
            .filter(|e| !e.value().is_closing())
            .map(|e| *e.key())
            .collect();
        keys.sort();
        keys
    }

    /// Number of open adapter contexts. Contexts being torn down are not
    /// counted.
    pub fn adapter_count(&self) -> usize {
        self.inner
            .contexts
            .iter()
            .filter(|e| !e.value().is_closing())
            .count()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("protocols", &self.inner.protocols)
            .field("adapters", &self.adapters())
            .finish()
    }
}

/// Builder for [`Dispatcher`]
pub struct DispatcherBuilder {
    protocols: ProtocolTable,
    config: DispatcherConfig,
    pools: Option<PoolRegistry>,
}

impl DispatcherBuilder {
    /// New builder with no protocols and default configuration
    pub fn new() -> Self {
        Self {
            protocols: ProtocolTable::new(),
            config: DispatcherConfig::default(),
            pools: None,
        }
    }

    /// Add a shared protocol
    pub fn protocol(mut self, protocol: Arc<dyn BusProtocol>) -> Self {
        self.protocols.register(protocol);
        self
    }

    /// Add a protocol by value
    pub fn with_protocol<P: BusProtocol>(self, protocol: P) -> Self {
        self.protocol(Arc::new(protocol))
    }

    /// Replace the protocol table
    pub fn protocols(mut self, protocols: ProtocolTable) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Allocate job pools from `pools`.
    ///
    /// Defaults to a registry private to this dispatcher; pass
    /// `PoolRegistry::global().clone()` to share pools process-wide.
    pub fn pool_registry(mut self, pools: PoolRegistry) -> Self {
        self.pools = Some(pools);
        self
    }

    /// Validate the configuration and build
    pub fn build(self) -> Result<Dispatcher> {
        self.config.validate()?;
        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                protocols: self.protocols,
                config: self.config,
                pools: self.pools.unwrap_or_default(),
                contexts: DashMap::new(),
            }),
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered client. Dropping it unregisters.
pub struct ClientHandle {
    client: ClientId,
    context: Arc<AdapterContext>,
    owner: Arc<DispatcherInner>,
    active: bool,
}

impl ClientHandle {
    /// The client this handle registered
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Unregister now
    pub fn unregister(self) {
        drop(self);
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        if std::mem::replace(&mut self.active, false) {
            self.owner.release(&self.client, &self.context);
        }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("client", &self.client)
            .field("adapter", &self.context.key())
            .finish()
    }
}
