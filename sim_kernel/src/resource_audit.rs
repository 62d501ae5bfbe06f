//! Resource acquisition audit log
//!
//! Every simulated platform service records each acquisition and release
//! it performs. Tests use the log to prove that nothing leaks and that
//! teardown happens in reverse order of acquisition.
//!
//! Audit logs are deterministic and queryable in tests but do not affect
//! the behaviour of the simulated services.

use core_types::NodeId;
use hal::{IrqCookie, PciAddress};
use std::sync::{Arc, Mutex, MutexGuard};

/// Class of a tracked resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    DeviceReference,
    DeviceEnable,
    MemRegion,
    MmioMapping,
    IrqRegistration,
    DeviceNode,
    StagingBuffer,
}

/// Resource acquisition or release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    DeviceReferenced { addr: PciAddress },
    DeviceReleased { addr: PciAddress },
    DeviceEnabled { addr: PciAddress },
    DeviceDisabled { addr: PciAddress },
    MemRegionRequested { base: u64, len: u64, owner: String },
    MemRegionReleased { base: u64, len: u64 },
    MmioMapped { phys: u64, len: u64 },
    MmioUnmapped { phys: u64, len: u64 },
    IrqRequested { irq: u32, cookie: IrqCookie, name: String },
    IrqFreed { irq: u32, cookie: IrqCookie },
    NodeRegistered { id: NodeId, name: String },
    NodeDeregistered { id: NodeId, name: String },
    StagingAllocated { len: usize },
    StagingFreed { len: usize },
}

impl ResourceEvent {
    /// Returns the resource class and +1 for acquisitions, -1 for releases
    pub fn effect(&self) -> (ResourceKind, i64) {
        match self {
            ResourceEvent::DeviceReferenced { .. } => (ResourceKind::DeviceReference, 1),
            ResourceEvent::DeviceReleased { .. } => (ResourceKind::DeviceReference, -1),
            ResourceEvent::DeviceEnabled { .. } => (ResourceKind::DeviceEnable, 1),
            ResourceEvent::DeviceDisabled { .. } => (ResourceKind::DeviceEnable, -1),
            ResourceEvent::MemRegionRequested { .. } => (ResourceKind::MemRegion, 1),
            ResourceEvent::MemRegionReleased { .. } => (ResourceKind::MemRegion, -1),
            ResourceEvent::MmioMapped { .. } => (ResourceKind::MmioMapping, 1),
            ResourceEvent::MmioUnmapped { .. } => (ResourceKind::MmioMapping, -1),
            ResourceEvent::IrqRequested { .. } => (ResourceKind::IrqRegistration, 1),
            ResourceEvent::IrqFreed { .. } => (ResourceKind::IrqRegistration, -1),
            ResourceEvent::NodeRegistered { .. } => (ResourceKind::DeviceNode, 1),
            ResourceEvent::NodeDeregistered { .. } => (ResourceKind::DeviceNode, -1),
            ResourceEvent::StagingAllocated { .. } => (ResourceKind::StagingBuffer, 1),
            ResourceEvent::StagingFreed { .. } => (ResourceKind::StagingBuffer, -1),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.effect().0
    }

    pub fn is_acquisition(&self) -> bool {
        self.effect().1 > 0
    }
}

/// Audit entry with its position in the global sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAuditEntry {
    pub seq: u64,
    pub event: ResourceEvent,
}

/// Resource audit log
#[derive(Debug, Default)]
pub struct ResourceAuditLog {
    entries: Vec<ResourceAuditEntry>,
}

impl ResourceAuditLog {
    /// Creates a new empty audit log
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records a resource event
    pub fn record_event(&mut self, event: ResourceEvent) {
        let seq = self.entries.len() as u64;
        self.entries.push(ResourceAuditEntry { seq, event });
    }

    /// Returns the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all entries
    pub fn get_entries(&self) -> &[ResourceAuditEntry] {
        &self.entries
    }

    /// Checks if any entry matches a predicate
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&ResourceEvent) -> bool,
    {
        self.entries.iter().any(|entry| predicate(&entry.event))
    }

    /// Counts events matching a predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ResourceEvent) -> bool,
    {
        self.entries
            .iter()
            .filter(|entry| predicate(&entry.event))
            .count()
    }

    /// Net number of live resources of one class
    pub fn live(&self, kind: ResourceKind) -> i64 {
        self.entries
            .iter()
            .map(|entry| entry.event.effect())
            .filter(|(k, _)| *k == kind)
            .map(|(_, delta)| delta)
            .sum()
    }

    /// Every class with a non-zero live count
    pub fn live_resources(&self) -> Vec<(ResourceKind, i64)> {
        let mut live: Vec<(ResourceKind, i64)> = Vec::new();
        for entry in &self.entries {
            let (kind, delta) = entry.event.effect();
            match live.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, count)) => *count += delta,
                None => live.push((kind, delta)),
            }
        }
        live.retain(|(_, count)| *count != 0);
        live
    }

    /// True when every acquisition has been released
    pub fn is_balanced(&self) -> bool {
        self.live_resources().is_empty()
    }

    /// Classes in the order they were acquired (staging buffers excluded)
    pub fn acquisition_order(&self) -> Vec<ResourceKind> {
        self.ordered(true)
    }

    /// Classes in the order they were released (staging buffers excluded)
    pub fn release_order(&self) -> Vec<ResourceKind> {
        self.ordered(false)
    }

    fn ordered(&self, acquisitions: bool) -> Vec<ResourceKind> {
        self.entries
            .iter()
            .filter(|entry| entry.event.is_acquisition() == acquisitions)
            .map(|entry| entry.event.kind())
            .filter(|kind| *kind != ResourceKind::StagingBuffer)
            .collect()
    }

    /// Drops all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Audit log shared by every simulated service of one platform
#[derive(Debug, Clone, Default)]
pub struct SharedAudit {
    log: Arc<Mutex<ResourceAuditLog>>,
}

impl SharedAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: ResourceEvent) {
        self.lock().record_event(event);
    }

    /// Locks the log for inspection
    pub fn lock(&self) -> MutexGuard<'_, ResourceAuditLog> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
