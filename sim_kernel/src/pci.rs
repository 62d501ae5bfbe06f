//! Simulated PCI bus

use crate::fault_injection::{PlatformFault, SharedFaults};
use crate::resource_audit::{ResourceEvent, SharedAudit};
use hal::{BarResource, MmioMapping, PciAddress, PciBus, PciDeviceId};
use kernel_api::Errno;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Base of the simulated kernel virtual window used by `ioremap`
const IOREMAP_BASE: usize = 0xffff_c900_0000_0000;

/// A device present on the simulated bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPciDevice {
    pub id: PciDeviceId,
    pub address: PciAddress,
    pub bars: [BarResource; 6],
    pub irq: u32,
}

impl SimPciDevice {
    pub fn new(id: PciDeviceId, address: PciAddress) -> Self {
        Self {
            id,
            address,
            bars: [BarResource::Unused; 6],
            irq: 0,
        }
    }

    pub fn with_bar(mut self, index: usize, bar: BarResource) -> Self {
        if let Some(slot) = self.bars.get_mut(index) {
            *slot = bar;
        }
        self
    }

    pub fn with_irq(mut self, irq: u32) -> Self {
        self.irq = irq;
        self
    }
}

#[derive(Debug, Default)]
struct BusState {
    devices: Vec<SimPciDevice>,
    references: HashMap<PciAddress, u32>,
    enabled: HashMap<PciAddress, bool>,
    regions: Vec<(u64, u64, String)>,
    mappings: Vec<MmioMapping>,
    next_virt: usize,
}

/// In-process PCI bus with fault injection and auditing
#[derive(Debug)]
pub struct SimPciBus {
    state: Mutex<BusState>,
    faults: SharedFaults,
    audit: SharedAudit,
}

impl SimPciBus {
    pub fn new(faults: SharedFaults, audit: SharedAudit) -> Self {
        Self {
            state: Mutex::new(BusState {
                next_virt: IOREMAP_BASE,
                ..BusState::default()
            }),
            faults,
            audit,
        }
    }

    /// Plugs a device into the bus
    pub fn insert_device(&self, device: SimPciDevice) {
        self.lock().devices.push(device);
    }

    /// Claims a memory range on behalf of some other driver
    pub fn claim_foreign_region(&self, base: u64, len: u64, owner: &str) {
        self.lock().regions.push((base, len, owner.to_string()));
    }

    /// Outstanding references on a device
    pub fn reference_count(&self, addr: PciAddress) -> u32 {
        self.lock().references.get(&addr).copied().unwrap_or(0)
    }

    pub fn is_enabled(&self, addr: PciAddress) -> bool {
        self.lock().enabled.get(&addr).copied().unwrap_or(false)
    }

    /// Number of live ioremap mappings
    pub fn mapping_count(&self) -> usize {
        self.lock().mappings.len()
    }

    /// Owner of the region starting at `base`, if claimed
    pub fn region_owner(&self, base: u64) -> Option<String> {
        self.lock()
            .regions
            .iter()
            .find(|(b, _, _)| *b == base)
            .map(|(_, _, owner)| owner.clone())
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn overlaps(a_base: u64, a_len: u64, b_base: u64, b_len: u64) -> bool {
        a_base < b_base.saturating_add(b_len) && b_base < a_base.saturating_add(a_len)
    }
}

impl PciBus for SimPciBus {
    fn get_device(&self, id: PciDeviceId) -> Option<PciAddress> {
        if self.faults.contains(&PlatformFault::DeviceAbsent) {
            return None;
        }
        let mut state = self.lock();
        let addr = state.devices.iter().find(|d| d.id == id)?.address;
        *state.references.entry(addr).or_insert(0) += 1;
        drop(state);
        self.audit.record(ResourceEvent::DeviceReferenced { addr });
        Some(addr)
    }

    fn put_device(&self, addr: PciAddress) {
        let mut state = self.lock();
        if let Some(count) = state.references.get_mut(&addr) {
            *count = count.saturating_sub(1);
        }
        drop(state);
        self.audit.record(ResourceEvent::DeviceReleased { addr });
    }

    fn enable_device(&self, addr: PciAddress) -> Result<(), Errno> {
        if let Some(errno) = self.faults.with(|plan| plan.enable_failure()) {
            return Err(errno);
        }
        self.lock().enabled.insert(addr, true);
        self.audit.record(ResourceEvent::DeviceEnabled { addr });
        Ok(())
    }

    fn disable_device(&self, addr: PciAddress) {
        self.lock().enabled.insert(addr, false);
        self.audit.record(ResourceEvent::DeviceDisabled { addr });
    }

    fn resource(&self, addr: PciAddress, bar: u8) -> BarResource {
        let resource = self
            .lock()
            .devices
            .iter()
            .find(|d| d.address == addr)
            .and_then(|d| d.bars.get(bar as usize).copied())
            .unwrap_or(BarResource::Unused);

        match resource {
            BarResource::Io { .. } if self.faults.contains(&PlatformFault::IoPortMissing) => {
                BarResource::Unused
            }
            BarResource::Memory { .. } if self.faults.contains(&PlatformFault::MmioAbsent) => {
                BarResource::Unused
            }
            other => other,
        }
    }

    fn irq_line(&self, addr: PciAddress) -> u32 {
        self.lock()
            .devices
            .iter()
            .find(|d| d.address == addr)
            .map(|d| d.irq)
            .unwrap_or(0)
    }

    fn request_mem_region(&self, base: u64, len: u64, owner: &str) -> Result<(), Errno> {
        if self.faults.contains(&PlatformFault::MemRegionBusy) {
            return Err(Errno::Busy);
        }
        let mut state = self.lock();
        if state
            .regions
            .iter()
            .any(|(b, l, _)| Self::overlaps(base, len, *b, *l))
        {
            return Err(Errno::Busy);
        }
        state.regions.push((base, len, owner.to_string()));
        drop(state);
        self.audit.record(ResourceEvent::MemRegionRequested {
            base,
            len,
            owner: owner.to_string(),
        });
        Ok(())
    }

    fn release_mem_region(&self, base: u64, len: u64) {
        let mut state = self.lock();
        if let Some(pos) = state
            .regions
            .iter()
            .position(|(b, l, _)| *b == base && *l == len)
        {
            state.regions.remove(pos);
        }
        drop(state);
        self.audit.record(ResourceEvent::MemRegionReleased { base, len });
    }

    fn ioremap(&self, base: u64, len: u64) -> Option<MmioMapping> {
        if self.faults.contains(&PlatformFault::RemapFails) {
            return None;
        }
        let mut state = self.lock();
        let mapping = MmioMapping {
            virt: state.next_virt,
            phys: base,
            len,
        };
        state.next_virt = state.next_virt.wrapping_add(len as usize).wrapping_add(0x1000);
        state.mappings.push(mapping);
        drop(state);
        self.audit
            .record(ResourceEvent::MmioMapped { phys: base, len });
        Some(mapping)
    }

    fn iounmap(&self, mapping: MmioMapping) {
        self.lock().mappings.retain(|m| *m != mapping);
        self.audit.record(ResourceEvent::MmioUnmapped {
            phys: mapping.phys,
            len: mapping.len,
        });
    }
}
