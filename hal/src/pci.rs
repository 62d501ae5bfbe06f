//! PCI bus abstraction
//!
//! This module abstracts the handful of bus services a PCI driver needs:
//! finding a device by its vendor/device pair, enabling it, reading its
//! base address registers, and claiming/mapping memory ranges.
//!
//! ## Ownership rules
//!
//! Every successful acquiring call has exactly one releasing counterpart:
//!
//! | acquire                | release                |
//! |------------------------|------------------------|
//! | `get_device`           | `put_device`           |
//! | `enable_device`        | `disable_device`       |
//! | `request_mem_region`   | `release_mem_region`   |
//! | `ioremap`              | `iounmap`              |
//!
//! Callers release in reverse order of acquisition.

use kernel_api::Errno;
use std::fmt;

/// Vendor/device identifier pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciDeviceId {
    pub vendor: u16,
    pub device: u16,
}

impl PciDeviceId {
    pub const fn new(vendor: u16, device: u16) -> Self {
        Self { vendor, device }
    }
}

impl fmt::Display for PciDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.device)
    }
}

/// Bus/device/function location of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Decoded base address register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarResource {
    /// BAR not implemented
    Unused,
    /// I/O port range
    Io { base: u16, len: u16 },
    /// Memory-mapped range
    Memory { base: u64, len: u64 },
}

impl BarResource {
    /// Start of the range (0 when unused)
    pub fn start(&self) -> u64 {
        match *self {
            BarResource::Unused => 0,
            BarResource::Io { base, .. } => base as u64,
            BarResource::Memory { base, .. } => base,
        }
    }

    /// Length of the range (0 when unused)
    pub fn len(&self) -> u64 {
        match *self {
            BarResource::Unused => 0,
            BarResource::Io { len, .. } => len as u64,
            BarResource::Memory { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A kernel virtual mapping of a physical memory range
///
/// Opaque token: only the bus that created it may interpret `virt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioMapping {
    pub virt: usize,
    pub phys: u64,
    pub len: u64,
}

/// Bus services used by PCI drivers
pub trait PciBus: Send + Sync {
    /// Looks up the first device matching `id` and takes a reference on it
    fn get_device(&self, id: PciDeviceId) -> Option<PciAddress>;

    /// Drops a reference taken by `get_device`
    fn put_device(&self, addr: PciAddress);

    /// Enables I/O, memory decoding and bus mastering
    fn enable_device(&self, addr: PciAddress) -> Result<(), Errno>;

    /// Reverses `enable_device`
    fn disable_device(&self, addr: PciAddress);

    /// Reads one of the six base address registers
    fn resource(&self, addr: PciAddress, bar: u8) -> BarResource;

    /// Returns the interrupt line routed to the device
    fn irq_line(&self, addr: PciAddress) -> u32;

    /// Claims exclusive ownership of a physical memory range
    ///
    /// Fails with [`Errno::Busy`] when another owner holds any part of it.
    fn request_mem_region(&self, base: u64, len: u64, owner: &str) -> Result<(), Errno>;

    /// Releases a range claimed with `request_mem_region`
    fn release_mem_region(&self, base: u64, len: u64);

    /// Maps a claimed physical range into kernel virtual space
    fn ioremap(&self, base: u64, len: u64) -> Option<MmioMapping>;

    /// Removes a mapping created with `ioremap`
    fn iounmap(&self, mapping: MmioMapping);
}
