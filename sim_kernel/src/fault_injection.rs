//! Deterministic fault injection for testing
//!
//! This module lets tests make individual platform services fail so that
//! every error path of a driver can be exercised, including the rollback
//! of partially acquired resources.
//!
//! ## Design Philosophy
//!
//! - **Deterministic**: A fault fires every time its operation is attempted
//! - **Composable**: Several faults can be combined in one plan
//! - **Live**: The plan can be swapped while a driver is loaded
//!
//! ## Example
//!
//! ```
//! use sim_kernel::fault_injection::{FaultPlan, PlatformFault};
//!
//! let plan = FaultPlan::new()
//!     .with_fault(PlatformFault::RemapFails)
//!     .with_fault(PlatformFault::AllocationFails);
//! assert!(plan.contains(&PlatformFault::RemapFails));
//! ```

use kernel_api::Errno;
use std::sync::{Arc, RwLock};

/// A single platform failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformFault {
    /// Device lookup finds nothing
    DeviceAbsent,

    /// Enabling the device fails with the given errno
    EnableFails(Errno),

    /// The I/O-port BAR reads as unused
    IoPortMissing,

    /// The MMIO BAR reads as unused
    MmioAbsent,

    /// Every memory region request reports a conflict
    MemRegionBusy,

    /// Every ioremap fails
    RemapFails,

    /// Interrupt registration fails with the given errno
    IrqRequestFails(Errno),

    /// Registering the node with this name fails with the given errno
    NodeRegistrationFails { name: String, errno: Errno },

    /// Every staging allocation reports exhaustion
    AllocationFails,
}

/// A plan describing all faults to inject
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    faults: Vec<PlatformFault>,
}

impl FaultPlan {
    /// Creates a new empty fault plan
    pub fn new() -> Self {
        Self { faults: Vec::new() }
    }

    /// Adds a fault to the plan
    pub fn with_fault(mut self, fault: PlatformFault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Returns all planned faults
    pub fn faults(&self) -> &[PlatformFault] {
        &self.faults
    }

    /// Checks whether a fault is planned
    pub fn contains(&self, fault: &PlatformFault) -> bool {
        self.faults.iter().any(|f| f == fault)
    }

    /// Returns the planned enable failure, if any
    pub fn enable_failure(&self) -> Option<Errno> {
        self.faults.iter().find_map(|f| match f {
            PlatformFault::EnableFails(errno) => Some(*errno),
            _ => None,
        })
    }

    /// Returns the planned interrupt registration failure, if any
    pub fn irq_failure(&self) -> Option<Errno> {
        self.faults.iter().find_map(|f| match f {
            PlatformFault::IrqRequestFails(errno) => Some(*errno),
            _ => None,
        })
    }

    /// Returns the planned registration failure for a node name, if any
    pub fn node_failure(&self, node_name: &str) -> Option<Errno> {
        self.faults.iter().find_map(|f| match f {
            PlatformFault::NodeRegistrationFails { name, errno } if name == node_name => {
                Some(*errno)
            }
            _ => None,
        })
    }
}

/// Fault plan shared by every simulated service of one platform
#[derive(Debug, Clone, Default)]
pub struct SharedFaults {
    plan: Arc<RwLock<FaultPlan>>,
}

impl SharedFaults {
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            plan: Arc::new(RwLock::new(plan)),
        }
    }

    /// Replaces the active plan
    pub fn set(&self, plan: FaultPlan) {
        match self.plan.write() {
            Ok(mut guard) => *guard = plan,
            Err(poisoned) => *poisoned.into_inner() = plan,
        }
    }

    /// Runs `f` against the active plan
    pub fn with<R>(&self, f: impl FnOnce(&FaultPlan) -> R) -> R {
        match self.plan.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    pub fn contains(&self, fault: &PlatformFault) -> bool {
        self.with(|plan| plan.contains(fault))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_plan_builder() {
        let plan = FaultPlan::new()
            .with_fault(PlatformFault::DeviceAbsent)
            .with_fault(PlatformFault::EnableFails(Errno::Io));

        assert_eq!(plan.faults().len(), 2);
        assert!(plan.contains(&PlatformFault::DeviceAbsent));
        assert_eq!(plan.enable_failure(), Some(Errno::Io));
        assert_eq!(plan.irq_failure(), None);
    }

    #[test]
    fn test_node_failure_matches_by_name() {
        let plan = FaultPlan::new().with_fault(PlatformFault::NodeRegistrationFails {
            name: "second".to_string(),
            errno: Errno::Busy,
        });

        assert_eq!(plan.node_failure("second"), Some(Errno::Busy));
        assert_eq!(plan.node_failure("first"), None);
    }

    #[test]
    fn test_shared_faults_can_be_swapped() {
        let shared = SharedFaults::new(FaultPlan::new());
        assert!(!shared.contains(&PlatformFault::AllocationFails));

        shared.set(FaultPlan::new().with_fault(PlatformFault::AllocationFails));
        assert!(shared.contains(&PlatformFault::AllocationFails));

        let clone = shared.clone();
        clone.set(FaultPlan::new());
        assert!(!shared.contains(&PlatformFault::AllocationFails));
    }
}
