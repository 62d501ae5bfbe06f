//! Command identifier encoding
//!
//! A command identifier packs the transfer direction, the transfer size,
//! a type byte and a command number into 32 bits, using the classic
//! `_IOC` layout:
//!
//! ```text
//!  31 30 | 29 ............ 16 | 15 ...... 8 | 7 ....... 0
//!   dir  |        size        |    type     |   number
//! ```
//!
//! The transport trusts only the size field: it decides how many bytes
//! are staged in each direction.

use bitflags::bitflags;
use std::fmt;

const NR_BITS: u32 = 8;
const TYPE_BITS: u32 = 8;
const SIZE_BITS: u32 = 14;
const DIR_BITS: u32 = 2;

const NR_SHIFT: u32 = 0;
const TYPE_SHIFT: u32 = NR_SHIFT + NR_BITS;
const SIZE_SHIFT: u32 = TYPE_SHIFT + TYPE_BITS;
const DIR_SHIFT: u32 = SIZE_SHIFT + SIZE_BITS;

const NR_MASK: u32 = (1 << NR_BITS) - 1;
const TYPE_MASK: u32 = (1 << TYPE_BITS) - 1;
const SIZE_MASK: u32 = (1 << SIZE_BITS) - 1;
const DIR_MASK: u32 = (1 << DIR_BITS) - 1;

/// Largest transfer size a command identifier can declare
pub const MAX_COMMAND_SIZE: usize = SIZE_MASK as usize;

bitflags! {
    /// Transfer direction, seen from the caller
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IoDirection: u32 {
        /// Caller writes data into the driver
        const WRITE = 1;
        /// Caller reads data from the driver
        const READ = 2;
    }
}

/// A command identifier with its encoded transfer size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(u32);

impl CommandId {
    /// Wraps a raw identifier as received from the caller
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Encodes an identifier; sizes above [`MAX_COMMAND_SIZE`] are truncated
    pub const fn new(direction: IoDirection, kind: u8, number: u8, size: usize) -> Self {
        let raw = ((direction.bits() & DIR_MASK) << DIR_SHIFT)
            | (((size as u32) & SIZE_MASK) << SIZE_SHIFT)
            | ((kind as u32) << TYPE_SHIFT)
            | ((number as u32) << NR_SHIFT);
        Self(raw)
    }

    /// Command without a data transfer
    pub const fn none(kind: u8, number: u8) -> Self {
        Self::new(IoDirection::empty(), kind, number, 0)
    }

    /// Command that returns `size` bytes to the caller
    pub const fn read(kind: u8, number: u8, size: usize) -> Self {
        Self::new(IoDirection::READ, kind, number, size)
    }

    /// Command that passes `size` bytes to the driver
    pub const fn write(kind: u8, number: u8, size: usize) -> Self {
        Self::new(IoDirection::WRITE, kind, number, size)
    }

    /// Command that passes and returns `size` bytes
    pub const fn read_write(kind: u8, number: u8, size: usize) -> Self {
        Self::new(IoDirection::READ.union(IoDirection::WRITE), kind, number, size)
    }

    /// Returns the raw identifier
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the declared transfer size in bytes
    pub const fn size(self) -> usize {
        ((self.0 >> SIZE_SHIFT) & SIZE_MASK) as usize
    }

    /// Returns the command number
    pub const fn number(self) -> u8 {
        ((self.0 >> NR_SHIFT) & NR_MASK) as u8
    }

    /// Returns the type byte
    pub const fn kind(self) -> u8 {
        ((self.0 >> TYPE_SHIFT) & TYPE_MASK) as u8
    }

    /// Returns the transfer direction
    pub const fn direction(self) -> IoDirection {
        IoDirection::from_bits_truncate((self.0 >> DIR_SHIFT) & DIR_MASK)
    }

    /// Returns a copy of this identifier with a different size field
    pub const fn with_size(self, size: usize) -> Self {
        let cleared = self.0 & !(SIZE_MASK << SIZE_SHIFT);
        Self(cleared | (((size as u32) & SIZE_MASK) << SIZE_SHIFT))
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#010x} (type {:#04x}, nr {}, {} bytes)",
            self.0,
            self.kind(),
            self.number(),
            self.size()
        )
    }
}
