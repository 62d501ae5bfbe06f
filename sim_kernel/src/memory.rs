//! Simulated staging allocator and caller address space

use crate::fault_injection::{PlatformFault, SharedFaults};
use crate::resource_audit::{ResourceEvent, SharedAudit};
use hal::{MemoryError, StagingAllocator, SystemAllocator};
use kernel_api::{TransferFault, UserMemory, UserPtr};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Heap allocator that counts and audits every staging buffer
#[derive(Debug)]
pub struct SimStagingAllocator {
    allocations: AtomicUsize,
    frees: AtomicUsize,
    faults: SharedFaults,
    audit: SharedAudit,
}

impl SimStagingAllocator {
    pub fn new(faults: SharedFaults, audit: SharedAudit) -> Self {
        Self {
            allocations: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
            faults,
            audit,
        }
    }

    /// Successful allocations so far
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Buffers handed back so far
    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    /// Buffers currently outstanding
    pub fn outstanding(&self) -> usize {
        self.allocations().saturating_sub(self.frees())
    }
}

impl StagingAllocator for SimStagingAllocator {
    fn allocate(&self, len: usize) -> Result<Box<[u8]>, MemoryError> {
        if self.faults.contains(&PlatformFault::AllocationFails) {
            return Err(MemoryError::OutOfMemory { requested: len });
        }
        let buf = SystemAllocator.allocate(len)?;
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.audit.record(ResourceEvent::StagingAllocated { len });
        Ok(buf)
    }

    fn free(&self, buf: Box<[u8]>) {
        let len = buf.len();
        SystemAllocator.free(buf);
        self.frees.fetch_add(1, Ordering::SeqCst);
        self.audit.record(ResourceEvent::StagingFreed { len });
    }
}

/// A sparse caller address space made of disjoint mapped regions
///
/// A transfer succeeds only if the whole range lies inside one region.
#[derive(Debug, Default)]
pub struct SimUserMemory {
    regions: Mutex<BTreeMap<u64, Vec<u8>>>,
    fail_copy_out: AtomicBool,
    copies_in: AtomicUsize,
    copies_out: AtomicUsize,
}

impl SimUserMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `len` zeroed bytes at `addr`
    pub fn map(&self, addr: UserPtr, len: usize) {
        self.map_bytes(addr, &vec![0; len]);
    }

    /// Maps a copy of `bytes` at `addr`
    pub fn map_bytes(&self, addr: UserPtr, bytes: &[u8]) {
        self.lock().insert(addr.addr(), bytes.to_vec());
    }

    /// Removes the region starting at `addr`
    pub fn unmap(&self, addr: UserPtr) {
        self.lock().remove(&addr.addr());
    }

    /// Reads back `len` bytes, or `None` if the range is not mapped
    pub fn read_bytes(&self, addr: UserPtr, len: usize) -> Option<Vec<u8>> {
        let regions = self.lock();
        let (offset, region) = Self::locate(&regions, addr, len)?;
        Some(region[offset..offset + len].to_vec())
    }

    /// Overwrites mapped bytes in place; returns false if the range is not mapped
    pub fn write_bytes(&self, addr: UserPtr, bytes: &[u8]) -> bool {
        let mut regions = self.lock();
        let Some((offset, _)) = Self::locate(&regions, addr, bytes.len()) else {
            return false;
        };
        let base = Self::region_base(&regions, addr);
        match base.and_then(|base| regions.get_mut(&base)) {
            Some(region) => {
                region[offset..offset + bytes.len()].copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Makes every subsequent copy to caller memory fault
    pub fn fail_copy_out(&self, fail: bool) {
        self.fail_copy_out.store(fail, Ordering::SeqCst);
    }

    /// Successful copies from caller memory
    pub fn copies_in(&self) -> usize {
        self.copies_in.load(Ordering::SeqCst)
    }

    /// Successful copies to caller memory
    pub fn copies_out(&self) -> usize {
        self.copies_out.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Vec<u8>>> {
        match self.regions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn region_base(regions: &BTreeMap<u64, Vec<u8>>, addr: UserPtr) -> Option<u64> {
        regions
            .range(..=addr.addr())
            .next_back()
            .map(|(base, _)| *base)
    }

    fn locate<'a>(
        regions: &'a BTreeMap<u64, Vec<u8>>,
        addr: UserPtr,
        len: usize,
    ) -> Option<(usize, &'a Vec<u8>)> {
        let (base, region) = regions.range(..=addr.addr()).next_back()?;
        let offset = usize::try_from(addr.addr() - base).ok()?;
        let end = offset.checked_add(len)?;
        (end <= region.len()).then_some((offset, region))
    }
}

impl UserMemory for SimUserMemory {
    fn copy_from_user(&self, dst: &mut [u8], src: UserPtr) -> Result<(), TransferFault> {
        if dst.is_empty() {
            return Ok(());
        }
        let fault = TransferFault {
            addr: src,
            len: dst.len(),
        };
        let regions = self.lock();
        let (offset, region) = Self::locate(&regions, src, dst.len()).ok_or(fault)?;
        dst.copy_from_slice(&region[offset..offset + dst.len()]);
        self.copies_in.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), TransferFault> {
        if src.is_empty() {
            return Ok(());
        }
        if self.fail_copy_out.load(Ordering::SeqCst) || !self.write_bytes(dst, src) {
            return Err(TransferFault {
                addr: dst,
                len: src.len(),
            });
        }
        self.copies_out.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
