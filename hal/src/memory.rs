//! Temporary buffer allocation

use kernel_api::Errno;
use thiserror::Error;

/// Errors that can occur during memory operations
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum MemoryError {
    /// Out of memory
    #[error("Out of memory ({requested} bytes requested)")]
    OutOfMemory { requested: usize },
}

impl From<MemoryError> for Errno {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::OutOfMemory { .. } => Errno::OutOfMemory,
        }
    }
}

/// Allocator for short-lived, zero-filled staging buffers
///
/// Every buffer returned by `allocate` is handed back through `free`
/// exactly once.
pub trait StagingAllocator: Send + Sync {
    fn allocate(&self, len: usize) -> Result<Box<[u8]>, MemoryError>;

    fn free(&self, buf: Box<[u8]>);
}

/// Heap-backed allocator that reports exhaustion instead of aborting
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl StagingAllocator for SystemAllocator {
    fn allocate(&self, len: usize) -> Result<Box<[u8]>, MemoryError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| MemoryError::OutOfMemory { requested: len })?;
        buf.resize(len, 0);
        Ok(buf.into_boxed_slice())
    }

    fn free(&self, buf: Box<[u8]>) {
        drop(buf);
    }
}
