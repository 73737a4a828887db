//! SMBus-style combined transfers
//!
//! Every message becomes one `smbus_xfer` call on the adapter driver. Payload
//! lengths are checked per kind before the driver sees them: byte kinds carry
//! exactly one byte, word kinds two, block kinds 1..=32.

use crate::protocol::BusProtocol;
use lightbus_core::{
    AdapterId, BusError, BusResult, ClientId, Direction, Message, MessageError, MessageKind,
    Payload, ProtocolTag, SMBUS_BLOCK_MAX,
};

/// Driver for one family of SMBus host adapters.
pub trait SmbusAdapter: Send + Sync + 'static {
    /// Perform one combined transfer.
    ///
    /// For reads `data` arrives sized to the requested length and is filled
    /// in place; block reads may shrink it to the count the device returned.
    fn smbus_xfer(
        &self,
        adapter: AdapterId,
        address: u16,
        direction: Direction,
        command: u8,
        kind: MessageKind,
        data: &mut Payload,
    ) -> BusResult<()>;

    /// Called once when the first client on `adapter` registers
    fn probe(&self, _adapter: AdapterId) -> BusResult<()> {
        Ok(())
    }

    /// Called once when the last client on `adapter` unregisters
    fn release(&self, _adapter: AdapterId) {}
}

/// [`BusProtocol`] over an [`SmbusAdapter`]
#[derive(Debug)]
pub struct SmbusProtocol<A> {
    adapter: A,
    tag: ProtocolTag,
}

impl<A: SmbusAdapter> SmbusProtocol<A> {
    /// Wrap an adapter driver, registered as `ProtocolTag::I2c`
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            tag: ProtocolTag::I2c,
        }
    }

    /// Register under a different tag (builder pattern).
    pub fn with_tag(mut self, tag: ProtocolTag) -> Self {
        self.tag = tag;
        self
    }

    /// The wrapped driver
    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

fn check_length(kind: MessageKind, len: usize) -> BusResult<()> {
    match kind {
        MessageKind::Packet => Err(BusError::Unsupported(kind)),
        MessageKind::BlockData | MessageKind::I2cBlock => {
            if len == 0 {
                Err(MessageError::LengthMismatch {
                    kind,
                    expected: 1,
                    actual: 0,
                }
                .into())
            } else if len > SMBUS_BLOCK_MAX {
                Err(MessageError::PayloadTooLarge {
                    len,
                    max: SMBUS_BLOCK_MAX,
                }
                .into())
            } else {
                Ok(())
            }
        }
        _ => match kind.fixed_len() {
            Some(expected) if expected != len => Err(MessageError::LengthMismatch {
                kind,
                expected,
                actual: len,
            }
            .into()),
            _ => Ok(()),
        },
    }
}

impl<A: SmbusAdapter> BusProtocol for SmbusProtocol<A> {
    fn tag(&self) -> ProtocolTag {
        self.tag
    }

    fn read(&self, client: &ClientId, message: &mut Message) -> BusResult<()> {
        check_length(message.kind, message.data.len())?;
        self.adapter.smbus_xfer(
            client.adapter,
            client.address,
            Direction::Read,
            message.command,
            message.kind,
            &mut message.data,
        )
    }

    fn write(&self, client: &ClientId, message: &Message) -> BusResult<()> {
        check_length(message.kind, message.data.len())?;
        let mut data = message.data.clone();
        self.adapter.smbus_xfer(
            client.adapter,
            client.address,
            Direction::Write,
            message.command,
            message.kind,
            &mut data,
        )
    }

    fn attach(&self, adapter: AdapterId) -> BusResult<()> {
        self.adapter.probe(adapter)
    }

    fn detach(&self, adapter: AdapterId) {
        self.adapter.release(adapter)
    }
}
