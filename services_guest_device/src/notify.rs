//! Notification broadcaster
//!
//! Two primitives carry "something changed" from interrupt context to
//! ordinary context:
//!
//! - [`WaitQueue`]: threads blocked in poll or read park on it and are
//!   unparked by [`WaitQueue::wake_all`].
//! - [`AsyncRegistry`]: sessions that asked for asynchronous notification
//!   receive a [`AsyncNotice`] through their [`SignalTarget`].
//!
//! Registration and removal happen in ordinary context. The notify side
//! only takes a spin lock, flips flags and unparks threads: it never
//! blocks, allocates or frees.

use bitflags::bitflags;
use core_types::SessionId;
use kernel_api::Errno;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// Signal number delivered to asynchronous subscribers
pub const SIGIO: i32 = 29;

/// Band reported with [`SIGIO`]: input is available
pub const POLL_IN: i32 = 1;

bitflags! {
    /// Readiness reported by poll
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PollMask: u32 {
        const POLLIN = 0x0001;
        const POLLERR = 0x0008;
        const POLLHUP = 0x0010;
        const POLLRDNORM = 0x0040;
    }
}

impl PollMask {
    pub fn readable() -> Self {
        PollMask::POLLIN | PollMask::POLLRDNORM
    }

    /// The device went away under the handle
    pub fn hangup() -> Self {
        PollMask::POLLERR | PollMask::POLLHUP
    }
}

/// A parked (or about to park) thread
#[derive(Debug)]
pub struct Waiter {
    thread: Thread,
    woken: AtomicBool,
}

impl Waiter {
    /// A waiter for the calling thread
    pub fn current() -> Arc<Self> {
        Arc::new(Self {
            thread: thread::current(),
            woken: AtomicBool::new(false),
        })
    }

    /// Marks the waiter woken and unparks its thread
    pub fn wake(&self) {
        self.woken.store(true, Ordering::Release);
        self.thread.unpark();
    }

    /// Parks until woken, the timeout expires, or a spurious wakeup
    ///
    /// A wake that arrived before the call returns immediately.
    pub fn park(&self, timeout: Option<Duration>) {
        if self.woken.swap(false, Ordering::AcqRel) {
            return;
        }
        match timeout {
            Some(timeout) => thread::park_timeout(timeout),
            None => thread::park(),
        }
        self.woken.store(false, Ordering::Release);
    }
}

/// Set of threads waiting for the next broadcast
#[derive(Debug, Default)]
pub struct WaitQueue {
    waiters: spin::Mutex<Vec<Arc<Waiter>>>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `waiter`; it stays queued until the registration is dropped
    pub fn register(&self, waiter: &Arc<Waiter>) -> WaitRegistration<'_> {
        self.waiters.lock().push(waiter.clone());
        WaitRegistration {
            queue: self,
            waiter: waiter.clone(),
        }
    }

    /// Wakes every queued waiter, returning how many were woken
    pub fn wake_all(&self) -> usize {
        let waiters = self.waiters.lock();
        for waiter in waiters.iter() {
            waiter.wake();
        }
        waiters.len()
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, waiter: &Arc<Waiter>) {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|w| Arc::ptr_eq(w, waiter)) {
            waiters.swap_remove(pos);
        }
    }
}

/// Keeps a waiter queued; removes it on drop
#[derive(Debug)]
pub struct WaitRegistration<'q> {
    queue: &'q WaitQueue,
    waiter: Arc<Waiter>,
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        self.queue.remove(&self.waiter);
    }
}

/// Registrations collected by one poll call
///
/// Dropping the table removes the caller from every queue it joined.
#[derive(Debug)]
pub struct PollTable<'q> {
    waiter: Arc<Waiter>,
    registrations: Vec<WaitRegistration<'q>>,
}

impl<'q> PollTable<'q> {
    /// A table for the calling thread
    pub fn new() -> Self {
        Self {
            waiter: Waiter::current(),
            registrations: Vec::new(),
        }
    }

    /// Joins `queue` unless already joined
    pub fn wait_on(&mut self, queue: &'q WaitQueue) {
        if self
            .registrations
            .iter()
            .any(|r| std::ptr::eq(r.queue, queue))
        {
            return;
        }
        self.registrations.push(queue.register(&self.waiter));
    }

    pub fn waiter(&self) -> &Arc<Waiter> {
        &self.waiter
    }

    pub fn is_registered(&self) -> bool {
        !self.registrations.is_empty()
    }
}

impl Default for PollTable<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupts blocking waits on one handle
///
/// A cancellation that finds no waiter stays pending and interrupts the
/// next wait. Each cancellation interrupts exactly one wait.
#[derive(Debug, Default)]
pub struct WaitCancel {
    pending: AtomicBool,
    waiters: WaitQueue,
}

impl WaitCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.pending.store(true, Ordering::Release);
        self.waiters.wake_all();
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

/// Delivered to asynchronous subscribers on every broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncNotice {
    pub signal: i32,
    pub band: i32,
}

impl AsyncNotice {
    pub const INPUT_AVAILABLE: AsyncNotice = AsyncNotice {
        signal: SIGIO,
        band: POLL_IN,
    };
}

/// Receiver of asynchronous notices, typically the owning process
///
/// `deliver` runs in interrupt context and must not block.
pub trait SignalTarget: Send + Sync {
    fn deliver(&self, notice: AsyncNotice);
}

/// Subscriptions keyed by session
#[derive(Default)]
pub struct AsyncRegistry {
    subscribers: spin::Mutex<Vec<(SessionId, Arc<dyn SignalTarget>)>>,
}

impl AsyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `session`, replacing any earlier target
    pub fn subscribe(&self, session: SessionId, target: Arc<dyn SignalTarget>) {
        let mut subscribers = self.subscribers.lock();
        match subscribers.iter_mut().find(|(id, _)| *id == session) {
            Some(entry) => entry.1 = target,
            None => subscribers.push((session, target)),
        }
    }

    /// Removes `session`; returns whether it was subscribed
    pub fn unsubscribe(&self, session: SessionId) -> bool {
        let removed = {
            let mut subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .position(|(id, _)| *id == session)
                .map(|pos| subscribers.swap_remove(pos))
        };
        removed.is_some()
    }

    pub fn is_subscribed(&self, session: SessionId) -> bool {
        self.subscribers.lock().iter().any(|(id, _)| *id == session)
    }

    /// Delivers `notice` to every subscriber, returning how many
    pub fn signal_all(&self, notice: AsyncNotice) -> usize {
        let subscribers = self.subscribers.lock();
        for (_, target) in subscribers.iter() {
            target.deliver(notice);
        }
        subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wait queue and subscriber registry of one device
#[derive(Default)]
pub struct Broadcaster {
    queue: WaitQueue,
    subscribers: AsyncRegistry,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self) -> &WaitQueue {
        &self.queue
    }

    pub fn subscribers(&self) -> &AsyncRegistry {
        &self.subscribers
    }

    pub fn wake_all(&self) -> usize {
        self.queue.wake_all()
    }

    pub fn signal_subscribers(&self) -> usize {
        self.subscribers.signal_all(AsyncNotice::INPUT_AVAILABLE)
    }

    /// Wakes every waiter, then signals every subscriber
    pub fn broadcast(&self) {
        self.wake_all();
        self.signal_subscribers();
    }

    /// Blocks until `ready` holds
    ///
    /// Returns `Ok(true)` once ready, `Ok(false)` when `timeout` expires
    /// and [`Errno::Interrupted`] when `cancel` fires. The caller is
    /// queued before `ready` is first evaluated, so a broadcast issued
    /// after that evaluation is never missed.
    pub fn wait_until(
        &self,
        cancel: &WaitCancel,
        timeout: Option<Duration>,
        mut ready: impl FnMut() -> bool,
    ) -> Result<bool, Errno> {
        let waiter = Waiter::current();
        let _queued = self.queue.register(&waiter);
        let _cancellable = cancel.waiters.register(&waiter);
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if cancel.take() {
                return Err(Errno::Interrupted);
            }
            if ready() {
                return Ok(true);
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            waiter.park(remaining);
        }
    }
}
