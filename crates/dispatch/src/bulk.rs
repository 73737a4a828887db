//! Bulk packet transfers (USB-style endpoints)
//!
//! Only `MessageKind::Packet` is carried. A transport moving fewer bytes than
//! the message holds is reported as a short transfer.

use crate::protocol::BusProtocol;
use lightbus_core::{AdapterId, BusError, BusResult, ClientId, Message, MessageKind, ProtocolTag};

/// Packet transport for one controller family.
pub trait BulkTransport: Send + Sync + 'static {
    /// Send one packet to the client's endpoint; returns bytes accepted
    fn send_packet(&self, client: &ClientId, data: &[u8]) -> BusResult<usize>;

    /// Receive one packet into `buf`; returns bytes received
    fn recv_packet(&self, client: &ClientId, buf: &mut [u8]) -> BusResult<usize>;

    /// Called once when the first client on `adapter` registers
    fn open(&self, _adapter: AdapterId) -> BusResult<()> {
        Ok(())
    }

    /// Called once when the last client on `adapter` unregisters
    fn close(&self, _adapter: AdapterId) {}
}

/// [`BusProtocol`] over a [`BulkTransport`]
#[derive(Debug)]
pub struct BulkProtocol<T> {
    transport: T,
    tag: ProtocolTag,
}

impl<T: BulkTransport> BulkProtocol<T> {
    /// Wrap a transport, registered as `ProtocolTag::Usb`
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            tag: ProtocolTag::Usb,
        }
    }

    /// Register under a different tag (builder pattern).
    pub fn with_tag(mut self, tag: ProtocolTag) -> Self {
        self.tag = tag;
        self
    }

    /// The wrapped transport
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

fn check_kind(message: &Message) -> BusResult<()> {
    if message.kind != MessageKind::Packet {
        return Err(BusError::Unsupported(message.kind));
    }
    message.validate()?;
    Ok(())
}

impl<T: BulkTransport> BusProtocol for BulkProtocol<T> {
    fn tag(&self) -> ProtocolTag {
        self.tag
    }

    fn read(&self, client: &ClientId, message: &mut Message) -> BusResult<()> {
        check_kind(message)?;
        let expected = message.data.len();
        let actual = self.transport.recv_packet(client, &mut message.data)?;
        if actual < expected {
            return Err(BusError::ShortTransfer { expected, actual });
        }
        Ok(())
    }

    fn write(&self, client: &ClientId, message: &Message) -> BusResult<()> {
        check_kind(message)?;
        let expected = message.data.len();
        let actual = self.transport.send_packet(client, &message.data)?;
        if actual != expected {
            return Err(BusError::ShortTransfer { expected, actual });
        }
        Ok(())
    }

    fn attach(&self, adapter: AdapterId) -> BusResult<()> {
        self.transport.open(adapter)
    }

    fn detach(&self, adapter: AdapterId) {
        self.transport.close(adapter)
    }
}
