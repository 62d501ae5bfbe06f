//! Driver lifecycle
//!
//! Loading walks a fixed sequence of stages:
//!
//! ```text
//! Unloaded -> ResourcesAcquired -> InterruptInstalled -> NodesRegistered -> Running
//! ```
//!
//! The common layer's device initialization runs between interrupt
//! installation and node registration. Every completed stage is held by a
//! guard, so a failure unwinds exactly the stages that completed, newest
//! first, and reports the error that stopped the load. Unloading drops the
//! same guards in the same order.

use crate::config::{ConfigError, DriverConfig};
use crate::dispatcher::{CommandDispatcher, CommonLayer};
use crate::extension::{DeviceExtension, OsType, StatsSnapshot};
use crate::handle::{Handle, OpenFlags};
use crate::idc::IdcConnection;
use crate::isr::InstalledInterrupt;
use crate::nodes::{DeviceNodes, NodeKind};
use crate::resources::{AcquireError, DeviceResources};
use crate::session::{SessionManager, SessionOrigin};
use crate::status::{Status, Translation};
use crate::VMMDEV_DEVICE_ID;
use hal::{Platform, StagingAllocator};
use kernel_api::Errno;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Stages of the driver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Unloaded,
    ResourcesAcquired,
    InterruptInstalled,
    NodesRegistered,
    Running,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Unloaded => "unloaded",
            DriverState::ResourcesAcquired => "resources acquired",
            DriverState::InterruptInstalled => "interrupt installed",
            DriverState::NodesRegistered => "nodes registered",
            DriverState::Running => "running",
        };
        write!(f, "{}", name)
    }
}

/// Why the driver failed to load
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Resource acquisition failed: {0}")]
    Resources(#[from] AcquireError),

    #[error("Interrupt installation failed: {0}")]
    Interrupt(Errno),

    #[error("Device initialization failed: {0}")]
    DeviceInit(Status),

    #[error("Node registration failed: {0}")]
    Nodes(Errno),
}

impl LoadError {
    /// The errno reported to whoever asked for the load
    pub fn errno(&self) -> Errno {
        match self {
            LoadError::Config(_) => Errno::InvalidArgument,
            LoadError::Resources(err) => err.errno(),
            LoadError::Interrupt(errno) | LoadError::Nodes(errno) => *errno,
            LoadError::DeviceInit(status) => match status.translate() {
                Translation::Failure(errno) | Translation::Fallback(errno) => errno,
                Translation::Success => Errno::Io,
            },
        }
    }

    /// The last stage that completed before the failure
    pub fn reached(&self) -> DriverState {
        match self {
            LoadError::Config(_) | LoadError::Resources(_) => DriverState::Unloaded,
            LoadError::Interrupt(_) => DriverState::ResourcesAcquired,
            LoadError::DeviceInit(_) | LoadError::Nodes(_) => DriverState::InterruptInstalled,
        }
    }
}

/// Common-layer device state; dropping it terminates the device
struct InitializedDevice {
    dispatcher: Arc<dyn CommandDispatcher>,
    ext: Arc<DeviceExtension>,
}

impl InitializedDevice {
    fn init(dispatcher: Arc<dyn CommandDispatcher>, ext: Arc<DeviceExtension>) -> Result<Self, Status> {
        let status = dispatcher.init_device(&ext);
        if status.is_failure() {
            error!(
                target: crate::LOG_TARGET,
                "{}: could not initialize device extension: {}",
                ext.name(),
                status
            );
            return Err(status);
        }
        Ok(Self { dispatcher, ext })
    }
}

impl Drop for InitializedDevice {
    fn drop(&mut self) {
        self.dispatcher.term_device(&self.ext);
    }
}

fn enter(name: &str, state: DriverState) -> DriverState {
    debug!(target: crate::LOG_TARGET, "{}: {}", name, state);
    state
}

/// The loaded driver
pub struct GuestDriver {
    // Field order is teardown order.
    nodes: DeviceNodes,
    _device: InitializedDevice,
    interrupt: InstalledInterrupt,
    resources: DeviceResources,
    sessions: SessionManager,
    allocator: Arc<dyn StagingAllocator>,
    config: DriverConfig,
    state: DriverState,
}

impl GuestDriver {
    /// Loads the driver onto `platform`
    pub fn load(config: DriverConfig, platform: Platform, common: CommonLayer) -> Result<Self, LoadError> {
        let name = config.device_name.clone();
        Self::build(config, platform, common).map_err(|err| {
            error!(
                target: crate::LOG_TARGET,
                "{}: load failed after {}: {}",
                name,
                err.reached(),
                err
            );
            err
        })
    }

    fn build(config: DriverConfig, platform: Platform, common: CommonLayer) -> Result<Self, LoadError> {
        config.validate()?;
        config.apply_log_level();
        let name = config.device_name.as_str();

        let resources = DeviceResources::acquire(platform.pci.clone(), VMMDEV_DEVICE_ID, name)?;
        enter(name, DriverState::ResourcesAcquired);

        let ext = Arc::new(DeviceExtension::new(name, resources.snapshot(), OsType::current()));
        let interrupt = InstalledInterrupt::install(platform.interrupts.clone(), ext.clone(), common.interrupts)
            .map_err(LoadError::Interrupt)?;
        enter(name, DriverState::InterruptInstalled);

        let device =
            InitializedDevice::init(common.dispatcher.clone(), ext.clone()).map_err(LoadError::DeviceInit)?;

        let nodes = DeviceNodes::register(platform.nodes.clone(), &config).map_err(LoadError::Nodes)?;
        enter(name, DriverState::NodesRegistered);

        let snapshot = ext.snapshot();
        let mmio = snapshot.mmio.unwrap_or_default();
        info!(
            target: crate::LOG_TARGET,
            "{}: major {}, IRQ {}, I/O port {:#x}, MMIO at {:#x} (size {:#x})",
            name,
            config.major,
            snapshot.irq,
            snapshot.io_base,
            mmio.phys,
            mmio.len
        );
        let state = enter(name, DriverState::Running);

        Ok(Self {
            nodes,
            _device: device,
            interrupt,
            resources,
            sessions: SessionManager::new(ext, common.dispatcher),
            allocator: platform.allocator,
            config,
            state,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn extension(&self) -> &Arc<DeviceExtension> {
        self.sessions.extension()
    }

    pub fn nodes(&self) -> &DeviceNodes {
        &self.nodes
    }

    pub fn resources(&self) -> &DeviceResources {
        &self.resources
    }

    pub fn irq(&self) -> u32 {
        self.interrupt.irq()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.extension().stats().snapshot()
    }

    /// Opens a handle through the node of the given kind
    pub fn open(&self, kind: NodeKind, flags: OpenFlags) -> Result<Handle, Errno> {
        Handle::open(kind, flags, self.sessions.clone(), self.allocator.clone())
            .map_err(|status| self.open_errno(status))
    }

    /// Opens a handle through the node published as `name`
    pub fn open_node(&self, name: &str, flags: OpenFlags) -> Result<Handle, Errno> {
        let kind = self.nodes.lookup(name).ok_or(Errno::NoDevice)?;
        self.open(kind, flags)
    }

    /// Opens a session for another kernel component
    pub fn idc_open(&self) -> Result<IdcConnection, Status> {
        let session = self.sessions.open(SessionOrigin::Kernel)?;
        Ok(IdcConnection::new(session, self.sessions.clone()))
    }

    fn open_errno(&self, status: Status) -> Errno {
        match status.translate() {
            Translation::Failure(errno) => errno,
            Translation::Fallback(errno) => {
                error!(
                    target: crate::LOG_TARGET,
                    "{}: unhandled status {} at open",
                    self.config.device_name,
                    status
                );
                self.extension().stats().unrecognized_status();
                errno
            }
            Translation::Success => Errno::Protocol,
        }
    }

    /// Tears the driver down in reverse order of loading
    pub fn unload(self) {
        drop(self);
    }
}

impl Drop for GuestDriver {
    fn drop(&mut self) {
        let name = self.config.device_name.as_str();
        let open = self.stats().sessions_open;
        if open > 0 {
            warn!(
                target: crate::LOG_TARGET,
                "{}: unloading with {} session(s) still open",
                name,
                open
            );
        }
        // Handles outlive the driver; cut them off before the device goes
        self.extension().retire();
        self.state = enter(name, DriverState::Unloaded);
    }
}

impl fmt::Debug for GuestDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestDriver")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("extension", self.extension())
            .finish_non_exhaustive()
    }
}
