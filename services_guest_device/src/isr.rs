//! Interrupt bridge
//!
//! The handler runs in interrupt context. It asks the common layer whether
//! the device raised the interrupt and, when the pointer-changed event is
//! among the acknowledged events, advances the sequence counter and
//! broadcasts. Nothing on this path blocks, allocates or logs. Once the
//! extension is retired the handler claims nothing.

use crate::dispatcher::InterruptSource;
use crate::extension::DeviceExtension;
use hal::{InterruptController, IrqCookie, IrqFlags, IrqHandler, IrqReturn};
use kernel_api::Errno;
use log::{debug, error};
use std::sync::Arc;

/// The registered interrupt service routine
pub struct InterruptBridge {
    ext: Arc<DeviceExtension>,
    source: Arc<dyn InterruptSource>,
}

impl InterruptBridge {
    pub fn new(ext: Arc<DeviceExtension>, source: Arc<dyn InterruptSource>) -> Self {
        Self { ext, source }
    }
}

impl IrqHandler for InterruptBridge {
    fn handle(&self, _irq: u32) -> IrqReturn {
        // A retired device is being torn down and no longer asks the common layer
        let Some(_live) = self.ext.hold() else {
            return IrqReturn::None;
        };
        let check = self.source.check_interrupt(&self.ext);
        if !check.ours {
            self.ext.stats().interrupt_spurious();
            return IrqReturn::None;
        }
        self.ext.stats().interrupt_handled();
        if check.events & self.ext.event_mask() != 0 {
            self.ext.bump_sequence();
            self.ext.broadcaster().broadcast();
        }
        IrqReturn::Handled
    }
}

/// A shared-line registration; dropping it uninstalls the handler
///
/// Once the drop returns no invocation of the handler is running or will
/// start.
pub struct InstalledInterrupt {
    controller: Arc<dyn InterruptController>,
    irq: u32,
    cookie: IrqCookie,
}

impl InstalledInterrupt {
    /// Registers the bridge on the extension's interrupt line, named after it
    pub fn install(
        controller: Arc<dyn InterruptController>,
        ext: Arc<DeviceExtension>,
        source: Arc<dyn InterruptSource>,
    ) -> Result<Self, Errno> {
        let irq = ext.snapshot().irq;
        let name = ext.name().to_string();
        let bridge = Arc::new(InterruptBridge::new(ext, source));
        let cookie = controller
            .request_irq(irq, IrqFlags::SHARED, &name, bridge)
            .map_err(|errno| {
                error!(target: crate::LOG_TARGET, "{}: could not request IRQ {}: {}", name, irq, errno);
                errno
            })?;
        debug!(target: crate::LOG_TARGET, "{}: handler installed on IRQ {}", name, irq);
        Ok(Self {
            controller,
            irq,
            cookie,
        })
    }

    pub fn irq(&self) -> u32 {
        self.irq
    }
}

impl Drop for InstalledInterrupt {
    fn drop(&mut self) {
        self.controller.free_irq(self.irq, self.cookie);
    }
}
