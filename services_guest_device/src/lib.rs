//! # Guest Device Driver
//!
//! Host-side driver for the hypervisor's guest communication device
//! (PCI 80ee:cafe). It claims the device, turns its interrupts into
//! wakeups and signals, and carries opaque commands between callers and
//! the common command dispatcher.
//!
//! ## Layout
//!
//! - [`resources`]: bus discovery, BAR validation, MMIO reservation
//! - [`isr`]: the shared interrupt handler
//! - [`session`] and [`handle`]: per-open state and file operations
//! - [`transport`]: staging of command buffers
//! - [`notify`]: wait queue and asynchronous subscriptions
//! - [`nodes`]: the restricted and user device nodes
//! - [`idc`]: sessions for other kernel components
//! - [`driver`]: load and unload
//!
//! The command set itself belongs to the common layer, reached through
//! [`CommandDispatcher`] and [`InterruptSource`].

pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod extension;
pub mod handle;
pub mod idc;
pub mod isr;
pub mod nodes;
pub mod notify;
pub mod resources;
pub mod session;
pub mod status;
pub mod transport;

pub use config::{ConfigError, DriverConfig, LogLevel};
pub use dispatcher::{CommandDispatcher, CommonLayer, DispatchOutcome, InterruptCheck, InterruptSource};
pub use driver::{DriverState, GuestDriver, LoadError};
pub use extension::{DeviceExtension, DeviceSnapshot, MmioInfo, OsType, StatsSnapshot};
pub use handle::{Handle, OpenFlags};
pub use idc::IdcConnection;
pub use nodes::{DeviceNodes, NodeKind};
pub use notify::{AsyncNotice, PollMask, PollTable, SignalTarget, WaitCancel, POLL_IN, SIGIO};
pub use resources::AcquireError;
pub use session::{Session, SessionOrigin};
pub use status::{Status, Translation};
pub use transport::{CommandEnvelope, INLINE_CAPACITY};

use hal::PciDeviceId;

/// PCI identity of the guest communication device
pub const VMMDEV_DEVICE_ID: PciDeviceId = PciDeviceId::new(0x80ee, 0xcafe);

/// Name of the restricted node and of the interrupt registration
pub const DEFAULT_DEVICE_NAME: &str = "vboxguest";

/// Name of the node open to every local user
pub const DEFAULT_USER_DEVICE_NAME: &str = "vboxuser";

/// The pointer position changed
pub const EVENT_MOUSE_POSITION_CHANGED: u32 = 1 << 9;

/// Version reported to kernel clients
pub const IDC_VERSION: u32 = 0x0001_0004;

pub(crate) const LOG_TARGET: &str = "vboxguest";
