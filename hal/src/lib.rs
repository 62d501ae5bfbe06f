//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the platform services a guest device driver is
//! written against.
//!
//! ## Design Principles
//!
//! 1. **Trait-based**: All bus, interrupt and node operations go through traits
//! 2. **Paired ownership**: Every acquiring call has one releasing counterpart
//! 3. **Testable**: `sim_kernel` implements every trait in-process

pub mod device_nodes;
pub mod interrupts;
pub mod memory;
pub mod pci;
pub mod platform;

pub use device_nodes::{NodeNumber, NodeRegistry, NodeSpec};
pub use interrupts::{InterruptController, IrqCookie, IrqFlags, IrqHandler, IrqReturn};
pub use memory::{MemoryError, StagingAllocator, SystemAllocator};
pub use pci::{BarResource, MmioMapping, PciAddress, PciBus, PciDeviceId};
pub use platform::Platform;
