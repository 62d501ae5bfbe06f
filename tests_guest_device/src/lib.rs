//! Guest Device Test Utilities
//!
//! This crate provides the scripted common layer and bootstrap helpers
//! shared by the integration tests in `tests/`.
//!
//! ## Test Philosophy
//!
//! - **Rollback under faults**: every injected platform failure leaves nothing behind
//! - **Deterministic failures**: all faults are reproducible via FaultPlan
//! - **Reverse teardown**: the audit log proves release order mirrors acquisition
//! - **Real threads**: blocking waits are exercised across threads, not mocked

use core_types::SessionId;
use kernel_api::{CommandId, UserPtr};
use services_guest_device::{
    AsyncNotice, CommandDispatcher, CommonLayer, DeviceExtension, DispatchOutcome, DriverConfig,
    GuestDriver, InterruptCheck, InterruptSource, LoadError, SessionOrigin, SignalTarget, Status,
};
use sim_kernel::test_utils::{standard_device, STANDARD_ID};
use sim_kernel::SimPlatform;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Address of the caller buffer most tests use
pub const ARG: UserPtr = UserPtr::new(0x4000_0000);

/// Interrupt line of the standard device
pub const IRQ: u32 = sim_kernel::test_utils::STANDARD_IRQ;

type Handler = Box<dyn Fn(CommandId, &mut [u8]) -> DispatchOutcome + Send + Sync>;
type Hook = Box<dyn Fn() + Send + Sync>;

/// A call the driver made into the common layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreCall {
    InitDevice,
    TermDevice,
    CreateSession(SessionId, SessionOrigin),
    CloseSession(SessionId),
    Dispatch(SessionId, CommandId),
}

/// Common layer whose answers are set by the test
pub struct ScriptedCore {
    handler: Mutex<Option<Handler>>,
    on_term: Mutex<Option<Hook>>,
    calls: Mutex<Vec<CoreCall>>,
    init_status: Mutex<Status>,
    session_status: Mutex<Status>,
    pending_events: AtomicU32,
    foreign: AtomicBool,
    dispatches: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ScriptedCore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handler: Mutex::new(None),
            on_term: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            init_status: Mutex::new(Status::SUCCESS),
            session_status: Mutex::new(Status::SUCCESS),
            pending_events: AtomicU32::new(0),
            foreign: AtomicBool::new(false),
            dispatches: AtomicUsize::new(0),
        })
    }

    /// Answers every command with `handler`
    pub fn respond_with(
        &self,
        handler: impl Fn(CommandId, &mut [u8]) -> DispatchOutcome + Send + Sync + 'static,
    ) {
        *lock(&self.handler) = Some(Box::new(handler));
    }

    /// Answers every command with `status`, writing `output` into the buffer
    ///
    /// The reported length is `output.len()` even when the buffer is
    /// shorter, so tests can provoke clamping.
    pub fn reply(&self, status: Status, output: &[u8]) {
        let output = output.to_vec();
        self.respond_with(move |_, buf| {
            let n = output.len().min(buf.len());
            buf[..n].copy_from_slice(&output[..n]);
            DispatchOutcome::new(status, output.len())
        });
    }

    /// Runs `hook` when the device is terminated
    pub fn on_term(&self, hook: impl Fn() + Send + Sync + 'static) {
        *lock(&self.on_term) = Some(Box::new(hook));
    }

    pub fn fail_init(&self, status: Status) {
        *lock(&self.init_status) = status;
    }

    pub fn fail_sessions(&self, status: Status) {
        *lock(&self.session_status) = status;
    }

    /// Events reported by the next interrupt check
    pub fn post_events(&self, events: u32) {
        self.pending_events.fetch_or(events, Ordering::SeqCst);
    }

    /// Makes interrupt checks report that the device did not interrupt
    pub fn set_foreign(&self, foreign: bool) {
        self.foreign.store(foreign, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CoreCall> {
        lock(&self.calls).clone()
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    /// Sessions created and neither closed nor dropped by device termination
    pub fn live_sessions(&self) -> usize {
        let mut live = HashSet::new();
        for call in lock(&self.calls).iter() {
            match call {
                CoreCall::CreateSession(session, _) => {
                    live.insert(*session);
                }
                CoreCall::CloseSession(session) => {
                    live.remove(session);
                }
                CoreCall::TermDevice => live.clear(),
                _ => {}
            }
        }
        live.len()
    }

    /// Calls made after the device was terminated
    pub fn calls_after_term(&self) -> Vec<CoreCall> {
        lock(&self.calls)
            .iter()
            .skip_while(|c| **c != CoreCall::TermDevice)
            .skip(1)
            .copied()
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&CoreCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: CoreCall) {
        lock(&self.calls).push(call);
    }
}

impl InterruptSource for ScriptedCore {
    fn check_interrupt(&self, _ext: &DeviceExtension) -> InterruptCheck {
        if self.foreign.load(Ordering::SeqCst) {
            return InterruptCheck::NOT_OURS;
        }
        InterruptCheck::ours(self.pending_events.swap(0, Ordering::SeqCst))
    }
}

impl CommandDispatcher for ScriptedCore {
    fn init_device(&self, _ext: &DeviceExtension) -> Status {
        self.record(CoreCall::InitDevice);
        *lock(&self.init_status)
    }

    fn term_device(&self, _ext: &DeviceExtension) {
        self.record(CoreCall::TermDevice);
        if let Some(hook) = lock(&self.on_term).as_ref() {
            hook();
        }
    }

    fn create_session(&self, _ext: &DeviceExtension, session: SessionId, origin: SessionOrigin) -> Status {
        let status = *lock(&self.session_status);
        if status.is_success() {
            self.record(CoreCall::CreateSession(session, origin));
        }
        status
    }

    fn close_session(&self, _ext: &DeviceExtension, session: SessionId) {
        self.record(CoreCall::CloseSession(session));
    }

    fn dispatch(&self, _ext: &DeviceExtension, session: SessionId, command: CommandId, buf: &mut [u8]) -> DispatchOutcome {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        self.record(CoreCall::Dispatch(session, command));
        match lock(&self.handler).as_ref() {
            Some(handler) => handler(command, buf),
            None => DispatchOutcome::new(Status::SUCCESS, 0),
        }
    }
}

/// Records every asynchronous notice it receives
#[derive(Debug, Default)]
pub struct SignalRecorder {
    notices: Mutex<Vec<AsyncNotice>>,
}

impl SignalRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        lock(&self.notices).len()
    }

    pub fn notices(&self) -> Vec<AsyncNotice> {
        lock(&self.notices).clone()
    }
}

impl SignalTarget for SignalRecorder {
    fn deliver(&self, notice: AsyncNotice) {
        lock(&self.notices).push(notice);
    }
}

/// Bootstrap helper for tests
///
/// Creates a simulated platform carrying the standard guest device and a
/// scripted common layer with default answers.
pub fn test_bootstrap() -> (SimPlatform, Arc<ScriptedCore>) {
    let sim = SimPlatform::new().with_device(standard_device(STANDARD_ID));
    (sim, ScriptedCore::new())
}

/// Loads the driver with `config` onto `sim`
pub fn load_with(sim: &SimPlatform, core: &Arc<ScriptedCore>, config: DriverConfig) -> Result<GuestDriver, LoadError> {
    GuestDriver::load(config, sim.platform(), CommonLayer::from_core(core.clone()))
}

/// Loads the driver with the default configuration
pub fn load(sim: &SimPlatform, core: &Arc<ScriptedCore>) -> Result<GuestDriver, LoadError> {
    load_with(sim, core, DriverConfig::default())
}

/// Raises the device interrupt with `events` pending
pub fn interrupt(sim: &SimPlatform, core: &ScriptedCore, events: u32) -> hal::IrqReturn {
    core.post_events(events);
    sim.raise_irq(IRQ)
}
