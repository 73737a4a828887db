//! Protocol messages
//!
//! A `Message` is one bus operation. Transfers are ordered lists of messages;
//! the dispatcher copies each one into a pooled transaction job for the
//! asynchronous path, or executes the caller's slice in place for the
//! synchronous path.

use crate::error::MessageError;
use crate::limits::MAX_BLOCK_SIZE;
use smallvec::SmallVec;

/// Message payload. Inline up to [`MAX_BLOCK_SIZE`] bytes.
pub type Payload = SmallVec<[u8; MAX_BLOCK_SIZE]>;

/// Transfer direction, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Host to device
    #[default]
    Write,
    /// Device to host; the payload is filled by the protocol
    Read,
}

/// Shape of the operation. SMBus kinds follow the SMBus transaction types;
/// `Packet` is a raw bulk transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    /// SMBus quick command; the direction bit is the data
    Quick,
    /// Single byte without a command code
    Byte,
    /// Command code + one data byte
    #[default]
    ByteData,
    /// Command code + little-endian 16-bit word
    WordData,
    /// Command code + length-prefixed block
    BlockData,
    /// Command code + raw I2C block (no length prefix on the wire)
    I2cBlock,
    /// Raw packet for bulk transports
    Packet,
}

impl MessageKind {
    /// Exact payload length this kind requires, if fixed.
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            MessageKind::Quick => Some(0),
            MessageKind::Byte | MessageKind::ByteData => Some(1),
            MessageKind::WordData => Some(2),
            MessageKind::BlockData | MessageKind::I2cBlock | MessageKind::Packet => None,
        }
    }
}

/// One protocol operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Operation shape
    pub kind: MessageKind,
    /// Read or write
    pub direction: Direction,
    /// Register / command code (ignored by `Quick`, `Byte` and `Packet`)
    pub command: u8,
    /// Data written, or buffer sized for the data to read
    pub data: Payload,
}

impl Message {
    /// Write `data` with the given kind and command code.
    pub fn write(kind: MessageKind, command: u8, data: &[u8]) -> Self {
        Self {
            kind,
            direction: Direction::Write,
            command,
            data: Payload::from_slice(data),
        }
    }

    /// Read `len` bytes with the given kind and command code.
    pub fn read(kind: MessageKind, command: u8, len: usize) -> Self {
        Self {
            kind,
            direction: Direction::Read,
            command,
            data: smallvec::smallvec![0; len],
        }
    }

    /// SMBus write-byte-data
    pub fn write_byte_data(command: u8, value: u8) -> Self {
        Self::write(MessageKind::ByteData, command, &[value])
    }

    /// SMBus read-byte-data
    pub fn read_byte_data(command: u8) -> Self {
        Self::read(MessageKind::ByteData, command, 1)
    }

    /// SMBus write-word-data (little endian on the wire)
    pub fn write_word_data(command: u8, value: u16) -> Self {
        Self::write(MessageKind::WordData, command, &value.to_le_bytes())
    }

    /// SMBus read-word-data
    pub fn read_word_data(command: u8) -> Self {
        Self::read(MessageKind::WordData, command, 2)
    }

    /// SMBus block write
    pub fn write_block(command: u8, data: &[u8]) -> Self {
        Self::write(MessageKind::BlockData, command, data)
    }

    /// SMBus block read of up to `len` bytes
    pub fn read_block(command: u8, len: usize) -> Self {
        Self::read(MessageKind::BlockData, command, len)
    }

    /// Raw packet write
    pub fn packet_write(data: &[u8]) -> Self {
        Self::write(MessageKind::Packet, 0, data)
    }

    /// Raw packet read of `len` bytes
    pub fn packet_read(len: usize) -> Self {
        Self::read(MessageKind::Packet, 0, len)
    }

    /// True for read messages
    pub fn is_read(&self) -> bool {
        self.direction == Direction::Read
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First data byte, if any
    pub fn byte(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Data interpreted as a little-endian word, if at least two bytes long
    pub fn word(&self) -> Option<u16> {
        match self.data.as_slice() {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }

    /// Check the payload against [`MAX_BLOCK_SIZE`] and the kind's fixed length.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.data.len() > MAX_BLOCK_SIZE {
            return Err(MessageError::PayloadTooLarge {
                len: self.data.len(),
                max: MAX_BLOCK_SIZE,
            });
        }
        if let Some(expected) = self.kind.fixed_len() {
            if self.data.len() != expected {
                return Err(MessageError::LengthMismatch {
                    kind: self.kind,
                    expected,
                    actual: self.data.len(),
                });
            }
        }
        Ok(())
    }

    /// Overwrite `self` with `other` without giving up the payload's buffer.
    pub fn copy_from(&mut self, other: &Message) {
        self.kind = other.kind;
        self.direction = other.direction;
        self.command = other.command;
        self.data.clear();
        self.data.extend_from_slice(&other.data);
    }
}
