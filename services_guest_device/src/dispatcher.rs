//! The common layer: device-independent guest logic the driver delegates to
//!
//! The driver owns buses, interrupts, nodes and caller memory. What a
//! command means, and whether an interrupt was raised by the device, is
//! decided by the common layer behind these two traits.

use crate::extension::DeviceExtension;
use crate::session::SessionOrigin;
use crate::status::Status;
use core_types::SessionId;
use kernel_api::CommandId;
use std::sync::Arc;

/// Result of asking the common layer about an interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptCheck {
    /// The device raised this interrupt
    pub ours: bool,
    /// Pending events acknowledged by the check
    pub events: u32,
}

impl InterruptCheck {
    pub const NOT_OURS: InterruptCheck = InterruptCheck {
        ours: false,
        events: 0,
    };

    pub const fn ours(events: u32) -> Self {
        Self { ours: true, events }
    }
}

/// Interrupt status check
pub trait InterruptSource: Send + Sync {
    /// Runs in interrupt context: must not block or allocate
    fn check_interrupt(&self, ext: &DeviceExtension) -> InterruptCheck;
}

/// What the dispatcher did with one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub status: Status,
    /// Bytes of valid output at the start of the buffer
    pub output_len: usize,
}

impl DispatchOutcome {
    pub const fn new(status: Status, output_len: usize) -> Self {
        Self { status, output_len }
    }

    pub const fn failed(status: Status) -> Self {
        Self {
            status,
            output_len: 0,
        }
    }
}

/// Command interpretation and per-device / per-session state
pub trait CommandDispatcher: Send + Sync {
    /// Initializes the device once interrupts are routed to the driver
    fn init_device(&self, ext: &DeviceExtension) -> Status;

    /// Reverses `init_device`, dropping the state of every session still attached
    fn term_device(&self, ext: &DeviceExtension);

    /// Attaches per-session state
    fn create_session(&self, ext: &DeviceExtension, session: SessionId, origin: SessionOrigin)
        -> Status;

    /// Releases per-session state
    fn close_session(&self, ext: &DeviceExtension, session: SessionId);

    /// Executes one command in place on `buf`
    fn dispatch(
        &self,
        ext: &DeviceExtension,
        session: SessionId,
        command: CommandId,
        buf: &mut [u8],
    ) -> DispatchOutcome;
}

/// The common layer as handed to the driver at load time
#[derive(Clone)]
pub struct CommonLayer {
    pub dispatcher: Arc<dyn CommandDispatcher>,
    pub interrupts: Arc<dyn InterruptSource>,
}

impl CommonLayer {
    pub fn new(
        dispatcher: Arc<dyn CommandDispatcher>,
        interrupts: Arc<dyn InterruptSource>,
    ) -> Self {
        Self {
            dispatcher,
            interrupts,
        }
    }

    /// Uses one object for both halves
    pub fn from_core<T>(core: Arc<T>) -> Self
    where
        T: CommandDispatcher + InterruptSource + 'static,
    {
        Self {
            dispatcher: core.clone(),
            interrupts: core,
        }
    }
}
