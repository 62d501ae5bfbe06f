//! Resource manager: bus discovery and register-window ownership
//!
//! Each acquired resource is held by a guard that releases it on drop.
//! [`DeviceResources`] declares its guards in reverse order of
//! acquisition, so dropping it (or failing halfway through
//! [`DeviceResources::acquire`]) tears down in exact reverse order.

use crate::extension::{DeviceSnapshot, MmioInfo};
use hal::{BarResource, MmioMapping, PciAddress, PciBus, PciDeviceId};
use kernel_api::Errno;
use log::{debug, error};
use std::sync::Arc;
use thiserror::Error;

/// Base address register holding the I/O ports
pub const IO_PORT_BAR: u8 = 0;

/// Base address register holding the MMIO window
pub const MMIO_BAR: u8 = 1;

/// Why the device could not be acquired
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("Device {0} not found")]
    DeviceNotFound(PciDeviceId),

    #[error("Could not enable device: {0}")]
    EnableFailed(Errno),

    #[error("BAR{bar} does not hold the expected resource")]
    ResourceMissing { bar: u8 },

    #[error("Memory region {base:#x}+{len:#x} is owned by someone else")]
    ReservationConflict { base: u64, len: u64 },

    #[error("ioremap of {base:#x}+{len:#x} failed")]
    MappingFailed { base: u64, len: u64 },
}

impl AcquireError {
    pub fn errno(&self) -> Errno {
        match self {
            AcquireError::DeviceNotFound(_) => Errno::NoDevice,
            AcquireError::EnableFailed(errno) => *errno,
            AcquireError::ResourceMissing { .. } => Errno::NoDeviceOrAddress,
            AcquireError::ReservationConflict { .. } => Errno::Busy,
            AcquireError::MappingFailed { .. } => Errno::OutOfMemory,
        }
    }
}

struct DeviceReference {
    pci: Arc<dyn PciBus>,
    addr: PciAddress,
}

impl Drop for DeviceReference {
    fn drop(&mut self) {
        self.pci.put_device(self.addr);
    }
}

struct EnabledDevice {
    pci: Arc<dyn PciBus>,
    addr: PciAddress,
}

impl Drop for EnabledDevice {
    fn drop(&mut self) {
        self.pci.disable_device(self.addr);
    }
}

struct ReservedRegion {
    pci: Arc<dyn PciBus>,
    base: u64,
    len: u64,
}

impl Drop for ReservedRegion {
    fn drop(&mut self) {
        self.pci.release_mem_region(self.base, self.len);
    }
}

struct MappedRegion {
    pci: Arc<dyn PciBus>,
    mapping: MmioMapping,
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        self.pci.iounmap(self.mapping);
    }
}

/// Reserved and mapped register window
///
/// Reservation and mapping live and die together: the mapping is undone
/// first, then the reservation.
pub struct MmioWindow {
    mapped: MappedRegion,
    _reserved: ReservedRegion,
}

impl MmioWindow {
    fn map(pci: &Arc<dyn PciBus>, base: u64, len: u64, owner: &str) -> Result<Self, AcquireError> {
        pci.request_mem_region(base, len, owner)
            .map_err(|_| AcquireError::ReservationConflict { base, len })?;
        let reserved = ReservedRegion {
            pci: pci.clone(),
            base,
            len,
        };
        let mapping = pci
            .ioremap(base, len)
            .ok_or(AcquireError::MappingFailed { base, len })?;
        Ok(Self {
            mapped: MappedRegion {
                pci: pci.clone(),
                mapping,
            },
            _reserved: reserved,
        })
    }

    pub fn info(&self) -> MmioInfo {
        MmioInfo {
            phys: self.mapped.mapping.phys,
            len: self.mapped.mapping.len,
            virt: self.mapped.mapping.virt,
        }
    }
}

/// Everything the driver holds on the bus
pub struct DeviceResources {
    // Field order is teardown order.
    mmio: Option<MmioWindow>,
    _enabled: EnabledDevice,
    _device: DeviceReference,
    addr: PciAddress,
    io_base: u16,
    io_len: u16,
    irq: u32,
}

impl DeviceResources {
    /// Finds, enables and maps the device identified by `id`
    ///
    /// BAR0 must be an I/O-port range. BAR1 must be a memory range; a
    /// zero-length BAR1 means the device has no register window.
    pub fn acquire(pci: Arc<dyn PciBus>, id: PciDeviceId, owner: &str) -> Result<Self, AcquireError> {
        let addr = pci.get_device(id).ok_or_else(|| {
            error!(target: crate::LOG_TARGET, "{}: guest PCI device {} not found", owner, id);
            AcquireError::DeviceNotFound(id)
        })?;
        let device = DeviceReference {
            pci: pci.clone(),
            addr,
        };

        pci.enable_device(addr).map_err(|errno| {
            error!(target: crate::LOG_TARGET, "{}: could not enable device: {}", owner, errno);
            AcquireError::EnableFailed(errno)
        })?;
        let enabled = EnabledDevice {
            pci: pci.clone(),
            addr,
        };

        let (io_base, io_len) = match pci.resource(addr, IO_PORT_BAR) {
            BarResource::Io { base, len } if base != 0 => (base, len),
            _ => {
                error!(target: crate::LOG_TARGET, "{}: did not find expected hardware resources", owner);
                return Err(AcquireError::ResourceMissing { bar: IO_PORT_BAR });
            }
        };

        let mmio = match pci.resource(addr, MMIO_BAR) {
            BarResource::Memory { base, len } if len > 0 => {
                let window = MmioWindow::map(&pci, base, len, owner).map_err(|err| {
                    error!(target: crate::LOG_TARGET, "{}: {}", owner, err);
                    err
                })?;
                Some(window)
            }
            BarResource::Unused | BarResource::Memory { .. } => None,
            BarResource::Io { .. } => {
                error!(target: crate::LOG_TARGET, "{}: BAR{} is not a memory range", owner, MMIO_BAR);
                return Err(AcquireError::ResourceMissing { bar: MMIO_BAR });
            }
        };

        debug!(
            target: crate::LOG_TARGET,
            "{}: acquired {} (I/O {:#x}+{:#x}, MMIO {})",
            owner,
            addr,
            io_base,
            io_len,
            if mmio.is_some() { "mapped" } else { "absent" }
        );

        Ok(Self {
            mmio,
            _enabled: enabled,
            _device: device,
            addr,
            io_base,
            io_len,
            irq: pci.irq_line(addr),
        })
    }

    pub fn address(&self) -> PciAddress {
        self.addr
    }

    pub fn irq(&self) -> u32 {
        self.irq
    }

    pub fn mmio(&self) -> Option<MmioInfo> {
        self.mmio.as_ref().map(MmioWindow::info)
    }

    /// Copy of the resources for the device extension
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            address: self.addr,
            io_base: self.io_base,
            io_len: self.io_len,
            mmio: self.mmio(),
            irq: self.irq,
        }
    }
}
