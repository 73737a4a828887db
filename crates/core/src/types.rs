//! Identity types
//!
//! - ProtocolTag: which bus protocol a client speaks
//! - AdapterId: opaque handle of one physical bus endpoint
//! - ClientId: protocol + adapter + device address

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bus protocol a client talks through.
///
/// The dispatcher keeps one protocol table entry per tag; adding a protocol
/// means registering a new entry, not touching the queue or pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolTag {
    /// I2C / SMBus combined transfers
    I2c,
    /// USB bulk/interrupt packet transfers
    Usb,
    /// Out-of-tree protocol identified by number
    Custom(u16),
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolTag::I2c => write!(f, "i2c"),
            ProtocolTag::Usb => write!(f, "usb"),
            ProtocolTag::Custom(n) => write!(f, "custom{}", n),
        }
    }
}

/// Identity of one physical adapter (I2C bus handle, USB controller handle).
///
/// Only equality matters; the value is never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdapterId(pub u64);

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device on an adapter: the identity copied into every transaction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId {
    /// Protocol used to reach the device
    pub protocol: ProtocolTag,
    /// Physical adapter the device sits on
    pub adapter: AdapterId,
    /// Device address (I2C 7-bit address, USB interface index)
    pub address: u16,
}

impl ClientId {
    /// Create a client identity
    pub fn new(protocol: ProtocolTag, adapter: AdapterId, address: u16) -> Self {
        Self {
            protocol,
            adapter,
            address,
        }
    }

    /// I2C device at `address` on bus `adapter`
    pub fn i2c(adapter: u64, address: u16) -> Self {
        Self::new(ProtocolTag::I2c, AdapterId(adapter), address)
    }

    /// USB interface `index` on controller `controller`
    pub fn usb(controller: u64, index: u16) -> Self {
        Self::new(ProtocolTag::Usb, AdapterId(controller), index)
    }

    /// Key identifying the shared adapter context of this client.
    pub fn adapter_key(&self) -> (ProtocolTag, AdapterId) {
        (self.protocol, self.adapter)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}@{:#04x}", self.protocol, self.adapter, self.address)
    }
}
