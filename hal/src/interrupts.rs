//! Interrupt handling abstraction
//!
//! Handlers run in interrupt context: they must not block, allocate or
//! touch caller memory. The controller guarantees that once `free_irq`
//! returns, the freed handler is neither running nor will run again.

use bitflags::bitflags;
use kernel_api::Errno;
use std::sync::Arc;

bitflags! {
    /// Registration flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqFlags: u32 {
        /// The line may be shared with other devices
        const SHARED = 1 << 0;
    }
}

/// Whether a handler recognised the interrupt as its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// Not raised by this handler's device
    None,
    /// Raised by this handler's device and serviced
    Handled,
}

impl IrqReturn {
    pub fn from_handled(handled: bool) -> Self {
        if handled {
            IrqReturn::Handled
        } else {
            IrqReturn::None
        }
    }

    pub fn is_handled(self) -> bool {
        self == IrqReturn::Handled
    }
}

/// An interrupt service routine
pub trait IrqHandler: Send + Sync {
    fn handle(&self, irq: u32) -> IrqReturn;
}

/// Identifies one registration on a (possibly shared) line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrqCookie(pub u64);

/// Interrupt line registration services
pub trait InterruptController: Send + Sync {
    /// Attaches `handler` to `irq`
    ///
    /// Non-shared registrations fail with [`Errno::Busy`] if the line is
    /// already in use.
    fn request_irq(
        &self,
        irq: u32,
        flags: IrqFlags,
        name: &str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<IrqCookie, Errno>;

    /// Detaches a registration; waits for a running invocation to finish
    fn free_irq(&self, irq: u32, cookie: IrqCookie);
}
