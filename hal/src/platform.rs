//! The set of platform services a driver is loaded against

use crate::device_nodes::NodeRegistry;
use crate::interrupts::InterruptController;
use crate::memory::{StagingAllocator, SystemAllocator};
use crate::pci::PciBus;
use std::sync::Arc;

/// Platform services handed to a driver at load time
#[derive(Clone)]
pub struct Platform {
    pub pci: Arc<dyn PciBus>,
    pub interrupts: Arc<dyn InterruptController>,
    pub nodes: Arc<dyn NodeRegistry>,
    pub allocator: Arc<dyn StagingAllocator>,
}

impl Platform {
    /// Bundles the services, using the heap for staging buffers
    pub fn new(
        pci: Arc<dyn PciBus>,
        interrupts: Arc<dyn InterruptController>,
        nodes: Arc<dyn NodeRegistry>,
    ) -> Self {
        Self {
            pci,
            interrupts,
            nodes,
            allocator: Arc::new(SystemAllocator),
        }
    }

    /// Replaces the staging allocator
    pub fn with_allocator(mut self, allocator: Arc<dyn StagingAllocator>) -> Self {
        self.allocator = allocator;
        self
    }
}
