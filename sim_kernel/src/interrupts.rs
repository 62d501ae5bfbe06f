//! Simulated interrupt controller
//!
//! Tests raise interrupts explicitly with [`SimInterruptController::raise`],
//! from any thread. Handlers run with the controller's line table locked,
//! so `free_irq` cannot return while an invocation of the freed handler is
//! still in flight.

use crate::fault_injection::SharedFaults;
use crate::resource_audit::{ResourceEvent, SharedAudit};
use hal::{InterruptController, IrqCookie, IrqFlags, IrqHandler, IrqReturn};
use kernel_api::Errno;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct Registration {
    irq: u32,
    cookie: IrqCookie,
    flags: IrqFlags,
    name: String,
    handler: Arc<dyn IrqHandler>,
}

/// In-process interrupt controller
pub struct SimInterruptController {
    lines: Mutex<Vec<Registration>>,
    next_cookie: AtomicU64,
    unhandled: AtomicU64,
    faults: SharedFaults,
    audit: SharedAudit,
}

impl SimInterruptController {
    pub fn new(faults: SharedFaults, audit: SharedAudit) -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            next_cookie: AtomicU64::new(1),
            unhandled: AtomicU64::new(0),
            faults,
            audit,
        }
    }

    /// Signals `irq` and runs every handler attached to it
    pub fn raise(&self, irq: u32) -> IrqReturn {
        let lines = self.lock();
        let mut handled = false;
        for registration in lines.iter().filter(|r| r.irq == irq) {
            handled |= registration.handler.handle(irq).is_handled();
        }
        drop(lines);
        if !handled {
            self.unhandled.fetch_add(1, Ordering::Relaxed);
        }
        IrqReturn::from_handled(handled)
    }

    /// Number of handlers attached to `irq`
    pub fn handler_count(&self, irq: u32) -> usize {
        self.lock().iter().filter(|r| r.irq == irq).count()
    }

    /// Names of the registrations on `irq`
    pub fn handler_names(&self, irq: u32) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|r| r.irq == irq)
            .map(|r| r.name.clone())
            .collect()
    }

    /// Raised interrupts no handler claimed
    pub fn unhandled_count(&self) -> u64 {
        self.unhandled.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl InterruptController for SimInterruptController {
    fn request_irq(
        &self,
        irq: u32,
        flags: IrqFlags,
        name: &str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<IrqCookie, Errno> {
        if let Some(errno) = self.faults.with(|plan| plan.irq_failure()) {
            return Err(errno);
        }
        let mut lines = self.lock();
        let conflict = lines.iter().any(|r| {
            r.irq == irq && !(r.flags.contains(IrqFlags::SHARED) && flags.contains(IrqFlags::SHARED))
        });
        if conflict {
            return Err(Errno::Busy);
        }
        let cookie = IrqCookie(self.next_cookie.fetch_add(1, Ordering::Relaxed));
        lines.push(Registration {
            irq,
            cookie,
            flags,
            name: name.to_string(),
            handler,
        });
        drop(lines);
        self.audit.record(ResourceEvent::IrqRequested {
            irq,
            cookie,
            name: name.to_string(),
        });
        Ok(cookie)
    }

    fn free_irq(&self, irq: u32, cookie: IrqCookie) {
        self.lock()
            .retain(|r| !(r.irq == irq && r.cookie == cookie));
        self.audit.record(ResourceEvent::IrqFreed { irq, cookie });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault_injection::{FaultPlan, PlatformFault};
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler {
        calls: AtomicUsize,
        claim: bool,
    }

    impl IrqHandler for CountingHandler {
        fn handle(&self, _irq: u32) -> IrqReturn {
            self.calls.fetch_add(1, Ordering::SeqCst);
            IrqReturn::from_handled(self.claim)
        }
    }

    fn controller(plan: FaultPlan) -> SimInterruptController {
        SimInterruptController::new(SharedFaults::new(plan), SharedAudit::new())
    }

    #[test]
    fn test_raise_runs_shared_handlers() {
        let ctl = controller(FaultPlan::new());
        let a = Arc::new(CountingHandler { calls: AtomicUsize::new(0), claim: false });
        let b = Arc::new(CountingHandler { calls: AtomicUsize::new(0), claim: true });
        ctl.request_irq(9, IrqFlags::SHARED, "a", a.clone()).unwrap();
        ctl.request_irq(9, IrqFlags::SHARED, "b", b.clone()).unwrap();

        assert_eq!(ctl.raise(9), IrqReturn::Handled);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.handler_names(9), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_exclusive_line_conflict() {
        let ctl = controller(FaultPlan::new());
        let h = Arc::new(CountingHandler { calls: AtomicUsize::new(0), claim: true });
        ctl.request_irq(5, IrqFlags::empty(), "first", h.clone()).unwrap();
        assert_eq!(
            ctl.request_irq(5, IrqFlags::SHARED, "second", h),
            Err(Errno::Busy)
        );
    }

    #[test]
    fn test_freed_handler_not_invoked() {
        let ctl = controller(FaultPlan::new());
        let h = Arc::new(CountingHandler { calls: AtomicUsize::new(0), claim: true });
        let cookie = ctl.request_irq(9, IrqFlags::SHARED, "dev", h.clone()).unwrap();
        ctl.free_irq(9, cookie);

        assert_eq!(ctl.raise(9), IrqReturn::None);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctl.unhandled_count(), 1);
    }

    #[test]
    fn test_injected_failure() {
        let ctl = controller(FaultPlan::new().with_fault(PlatformFault::IrqRequestFails(Errno::Io)));
        let h = Arc::new(CountingHandler { calls: AtomicUsize::new(0), claim: true });
        assert_eq!(ctl.request_irq(9, IrqFlags::SHARED, "dev", h), Err(Errno::Io));
        assert_eq!(ctl.handler_count(9), 0);
    }
}
