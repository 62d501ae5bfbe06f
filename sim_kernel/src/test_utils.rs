//! Test utilities for driver tests
//!
//! Canned devices and address-space layouts shared by unit and
//! integration tests.

use crate::memory::SimUserMemory;
use crate::pci::SimPciDevice;
use hal::{BarResource, PciAddress, PciDeviceId};
use kernel_api::UserPtr;

/// Vendor/device pair of the guest device
pub const STANDARD_ID: PciDeviceId = PciDeviceId::new(0x80ee, 0xcafe);

/// Bus location of the canned device
pub const STANDARD_ADDRESS: PciAddress = PciAddress::new(0, 4, 0);

/// Interrupt line of the canned device
pub const STANDARD_IRQ: u32 = 9;

pub const STANDARD_IO_BASE: u16 = 0xd020;
pub const STANDARD_IO_LEN: u16 = 0x20;
pub const STANDARD_MMIO_BASE: u64 = 0xf040_0000;
pub const STANDARD_MMIO_LEN: u64 = 0x40_0000;

/// A device laid out like the real one: I/O ports in BAR0, MMIO in BAR1
pub fn standard_device(id: PciDeviceId) -> SimPciDevice {
    SimPciDevice::new(id, STANDARD_ADDRESS)
        .with_bar(
            0,
            BarResource::Io {
                base: STANDARD_IO_BASE,
                len: STANDARD_IO_LEN,
            },
        )
        .with_bar(
            1,
            BarResource::Memory {
                base: STANDARD_MMIO_BASE,
                len: STANDARD_MMIO_LEN,
            },
        )
        .with_irq(STANDARD_IRQ)
}

/// The canned device without its MMIO window
pub fn device_without_mmio(id: PciDeviceId) -> SimPciDevice {
    standard_device(id).with_bar(1, BarResource::Unused)
}

/// Maps a caller buffer holding `bytes` and returns its address
pub fn caller_buffer(memory: &SimUserMemory, addr: u64, bytes: &[u8]) -> UserPtr {
    let ptr = UserPtr::new(addr);
    memory.map_bytes(ptr, bytes);
    ptr
}
