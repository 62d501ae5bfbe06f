//! Access to caller-owned memory
//!
//! The driver never dereferences a caller address directly. Every transfer
//! between caller memory and kernel-owned buffers goes through
//! [`UserMemory`], which may fail at any time because the caller can unmap
//! or protect the range concurrently.

use crate::error::Errno;
use std::fmt;
use thiserror::Error;

/// An address in the calling process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserPtr(u64);

impl UserPtr {
    /// Wraps a raw caller address
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// The null caller address
    pub const fn null() -> Self {
        Self(0)
    }

    /// Returns the raw address
    pub const fn addr(self) -> u64 {
        self.0
    }

    /// Returns true for the null address
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the address `offset` bytes further on
    pub const fn offset(self, offset: u64) -> Self {
        Self(self.0.wrapping_add(offset))
    }
}

impl fmt::Display for UserPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A copy to or from caller memory touched an invalid range
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Transfer fault at {addr} ({len} bytes)")]
pub struct TransferFault {
    /// Start of the attempted transfer
    pub addr: UserPtr,
    /// Length of the attempted transfer
    pub len: usize,
}

impl From<TransferFault> for Errno {
    fn from(_: TransferFault) -> Self {
        Errno::Fault
    }
}

/// Copy primitives for caller memory
///
/// Implementations must copy all of the requested bytes or none of them;
/// a partial copy is reported as a fault.
pub trait UserMemory: Send + Sync {
    /// Copies `dst.len()` bytes starting at `src` into `dst`
    fn copy_from_user(&self, dst: &mut [u8], src: UserPtr) -> Result<(), TransferFault>;

    /// Copies all of `src` to caller memory starting at `dst`
    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), TransferFault>;
}
