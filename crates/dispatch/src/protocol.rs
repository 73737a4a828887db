//! Protocol table
//!
//! A protocol is a pair of read/write primitives plus per-adapter setup
//! hooks. The dispatcher routes each client to its protocol by tag, so a new
//! bus type is one more table entry; the queue and pool never change.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut table = ProtocolTable::new();
//! table.register(Arc::new(SmbusProtocol::new(i2c_adapter)));
//! table.register(Arc::new(BulkProtocol::new(usb_transport)));
//!
//! let proto = table.get(ProtocolTag::I2c);
//! ```

use lightbus_core::{AdapterId, BusResult, ClientId, Message, ProtocolTag};
use std::collections::HashMap;
use std::sync::Arc;

/// Read/write primitives for one bus protocol.
///
/// Implementations must be callable from any thread; the dispatcher
/// guarantees at most one call in flight per adapter.
pub trait BusProtocol: Send + Sync + 'static {
    /// Tag this protocol is registered under
    fn tag(&self) -> ProtocolTag;

    /// Execute a read, filling `message.data`
    fn read(&self, client: &ClientId, message: &mut Message) -> BusResult<()>;

    /// Execute a write of `message.data`
    fn write(&self, client: &ClientId, message: &Message) -> BusResult<()>;

    /// One-time setup when the first client on a physical adapter registers
    fn attach(&self, _adapter: AdapterId) -> BusResult<()> {
        Ok(())
    }

    /// Teardown when the last client on the adapter unregisters
    fn detach(&self, _adapter: AdapterId) {}
}

/// Run one message through its protocol primitive
pub(crate) fn execute_message(
    protocol: &dyn BusProtocol,
    client: &ClientId,
    message: &mut Message,
) -> BusResult<()> {
    if message.is_read() {
        protocol.read(client, message)
    } else {
        protocol.write(client, message)
    }
}

/// Protocols by tag
#[derive(Clone, Default)]
pub struct ProtocolTable {
    protocols: HashMap<ProtocolTag, Arc<dyn BusProtocol>>,
}

impl ProtocolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a protocol under its own tag.
    ///
    /// Returns the protocol previously registered for that tag, if any.
    pub fn register(&mut self, protocol: Arc<dyn BusProtocol>) -> Option<Arc<dyn BusProtocol>> {
        self.protocols.insert(protocol.tag(), protocol)
    }

    /// Get protocol by tag
    pub fn get(&self, tag: ProtocolTag) -> Option<Arc<dyn BusProtocol>> {
        self.protocols.get(&tag).cloned()
    }

    /// Check if a tag is registered
    pub fn contains(&self, tag: ProtocolTag) -> bool {
        self.protocols.contains_key(&tag)
    }

    /// All registered tags, sorted
    pub fn tags(&self) -> Vec<ProtocolTag> {
        let mut tags: Vec<ProtocolTag> = self.protocols.keys().copied().collect();
        tags.sort();
        tags
    }

    /// Number of registered protocols
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

impl std::fmt::Debug for ProtocolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolTable")
            .field("tags", &self.tags())
            .finish()
    }
}
