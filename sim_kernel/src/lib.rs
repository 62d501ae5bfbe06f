//! # Simulated Kernel
//!
//! This crate provides an in-process implementation of every platform
//! service in `hal`, plus a simulated caller address space.
//!
//! ## Purpose
//!
//! The simulated kernel allows testing driver behavior without hardware:
//! - Runs under `cargo test`
//! - Deterministic (faults fire on every attempt, interrupts are raised explicitly)
//! - Inspectable (every acquisition and release lands in one audit log)
//!
//! Interrupts may be raised from any test thread, so blocking waits in the
//! driver are exercised against real concurrency.

pub mod fault_injection;
pub mod interrupts;
pub mod memory;
pub mod nodes;
pub mod pci;
pub mod resource_audit;
pub mod test_utils;

use fault_injection::{FaultPlan, SharedFaults};
use hal::{IrqReturn, Platform};
use interrupts::SimInterruptController;
use memory::{SimStagingAllocator, SimUserMemory};
use nodes::SimNodeRegistry;
use pci::{SimPciBus, SimPciDevice};
use resource_audit::{ResourceAuditLog, SharedAudit};
use std::sync::{Arc, MutexGuard};

/// A complete simulated platform
///
/// All services share one fault plan and one audit log.
#[derive(Clone)]
pub struct SimPlatform {
    pub pci: Arc<SimPciBus>,
    pub interrupts: Arc<SimInterruptController>,
    pub nodes: Arc<SimNodeRegistry>,
    pub allocator: Arc<SimStagingAllocator>,
    pub user_memory: Arc<SimUserMemory>,
    faults: SharedFaults,
    audit: SharedAudit,
}

impl SimPlatform {
    /// Creates an empty platform with no devices and no faults
    pub fn new() -> Self {
        let faults = SharedFaults::new(FaultPlan::new());
        let audit = SharedAudit::new();
        Self {
            pci: Arc::new(SimPciBus::new(faults.clone(), audit.clone())),
            interrupts: Arc::new(SimInterruptController::new(faults.clone(), audit.clone())),
            nodes: Arc::new(SimNodeRegistry::new(faults.clone(), audit.clone())),
            allocator: Arc::new(SimStagingAllocator::new(faults.clone(), audit.clone())),
            user_memory: Arc::new(SimUserMemory::new()),
            faults,
            audit,
        }
    }

    /// Plugs a device into the bus
    pub fn with_device(self, device: SimPciDevice) -> Self {
        self.pci.insert_device(device);
        self
    }

    /// Installs a fault plan
    pub fn with_fault_plan(self, plan: FaultPlan) -> Self {
        self.faults.set(plan);
        self
    }

    /// Replaces the fault plan of a running platform
    pub fn set_fault_plan(&self, plan: FaultPlan) {
        self.faults.set(plan);
    }

    /// The services as the driver sees them
    pub fn platform(&self) -> Platform {
        Platform::new(
            self.pci.clone(),
            self.interrupts.clone(),
            self.nodes.clone(),
        )
        .with_allocator(self.allocator.clone())
    }

    /// Raises `irq` on the calling thread
    pub fn raise_irq(&self, irq: u32) -> IrqReturn {
        self.interrupts.raise(irq)
    }

    /// Locks the shared audit log
    pub fn audit(&self) -> MutexGuard<'_, ResourceAuditLog> {
        self.audit.lock()
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}
