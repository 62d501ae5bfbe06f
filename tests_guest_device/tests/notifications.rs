//! Notification Tests
//!
//! Validates the path from a device interrupt to poll readiness, the read
//! sentinel and asynchronous signal delivery.

use hal::IrqReturn;
use kernel_api::{Errno, UserPtr};
use services_guest_device::{
    AsyncNotice, NodeKind, OpenFlags, PollMask, PollTable, EVENT_MOUSE_POSITION_CHANGED, POLL_IN, SIGIO,
};
use sim_kernel::test_utils::caller_buffer;
use tests_guest_device::{interrupt, load, test_bootstrap, SignalRecorder, ARG, IRQ};

/// Test: Counter at 5, one interrupt, one read
///
/// This validates that:
/// 1. A fresh handle is not readable whatever the counter value
/// 2. A pointer-change interrupt makes it readable
/// 3. Reading consumes the change
#[test]
fn test_counter_five_scenario() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    for _ in 0..5 {
        interrupt(&sim, &core, EVENT_MOUSE_POSITION_CHANGED);
    }
    assert_eq!(driver.extension().sequence(), 5);

    let handle = driver
        .open(NodeKind::User, OpenFlags::NONBLOCK)
        .expect("Failed to open handle");
    assert!(handle.poll(None).is_empty());

    assert_eq!(interrupt(&sim, &core, EVENT_MOUSE_POSITION_CHANGED), IrqReturn::Handled);
    assert_eq!(handle.poll(None), PollMask::POLLIN | PollMask::POLLRDNORM);

    caller_buffer(&sim.user_memory, ARG.addr(), &[0xff; 4]);
    assert_eq!(handle.read(sim.user_memory.as_ref(), ARG, 4, 0), Ok(1));
    assert_eq!(sim.user_memory.read_bytes(ARG, 4), Some(vec![0, 0xff, 0xff, 0xff]));
    assert!(handle.poll(None).is_empty());
    assert_eq!(handle.read(sim.user_memory.as_ref(), ARG, 4, 0), Ok(0));
}

/// Test: Poll is idempotent without an intervening interrupt
#[test]
fn test_poll_is_idempotent() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let handle = driver
        .open(NodeKind::Restricted, OpenFlags::empty())
        .expect("Failed to open handle");
    let queue = driver.extension().broadcaster().queue();

    let mut table = PollTable::new();
    assert!(handle.poll(Some(&mut table)).is_empty());
    assert!(handle.poll(Some(&mut table)).is_empty());
    assert_eq!(queue.len(), 1);

    interrupt(&sim, &core, EVENT_MOUSE_POSITION_CHANGED);
    assert_eq!(handle.poll(Some(&mut table)), PollMask::readable());
    assert_eq!(handle.poll(Some(&mut table)), PollMask::readable());

    drop(table);
    assert!(queue.is_empty());
}

/// Test: Only the pointer-change event advances the counter
#[test]
fn test_other_events_do_not_notify() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let handle = driver
        .open(NodeKind::User, OpenFlags::NONBLOCK)
        .expect("Failed to open handle");

    assert_eq!(interrupt(&sim, &core, 1 << 2), IrqReturn::Handled);
    assert_eq!(interrupt(&sim, &core, 0), IrqReturn::Handled);
    assert!(handle.poll(None).is_empty());
    assert_eq!(driver.extension().sequence(), 0);
    assert_eq!(driver.stats().interrupts_handled, 2);
}

/// Test: Interrupts raised by other devices on the shared line
#[test]
fn test_foreign_interrupt_is_not_claimed() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    core.set_foreign(true);

    assert_eq!(sim.raise_irq(IRQ), IrqReturn::None);
    assert_eq!(driver.extension().sequence(), 0);
    assert_eq!(driver.stats().interrupts_spurious, 1);
    assert_eq!(sim.interrupts.unhandled_count(), 1);
}

/// Test: Subscribers receive SIGIO until their session closes
///
/// This validates that:
/// 1. Every broadcast delivers SIGIO with band POLL_IN
/// 2. Closing the handle stops delivery
/// 3. Other subscribers are unaffected
#[test]
fn test_async_subscription_follows_session() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let mut first = driver
        .open(NodeKind::User, OpenFlags::empty())
        .expect("Failed to open handle");
    let second = driver
        .open(NodeKind::Restricted, OpenFlags::empty())
        .expect("Failed to open handle");
    let first_target = SignalRecorder::new();
    let second_target = SignalRecorder::new();

    first
        .fasync(true, Some(first_target.clone()))
        .expect("Failed to subscribe");
    second
        .fasync(true, Some(second_target.clone()))
        .expect("Failed to subscribe");

    interrupt(&sim, &core, EVENT_MOUSE_POSITION_CHANGED);
    assert_eq!(
        first_target.notices(),
        vec![AsyncNotice {
            signal: SIGIO,
            band: POLL_IN
        }]
    );

    first.close();
    interrupt(&sim, &core, EVENT_MOUSE_POSITION_CHANGED);
    assert_eq!(first_target.count(), 1);
    assert_eq!(second_target.count(), 2);
}

/// Test: Subscribing without a target is rejected
#[test]
fn test_fasync_requires_target() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let handle = driver
        .open(NodeKind::User, OpenFlags::empty())
        .expect("Failed to open handle");

    assert_eq!(handle.fasync(true, None), Err(Errno::InvalidArgument));
    assert_eq!(handle.fasync(false, None), Ok(()));
    assert!(driver.extension().broadcaster().subscribers().is_empty());
}

/// Test: Read with a non-zero offset
#[test]
fn test_read_rejects_offset() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let handle = driver
        .open(NodeKind::User, OpenFlags::NONBLOCK)
        .expect("Failed to open handle");
    interrupt(&sim, &core, EVENT_MOUSE_POSITION_CHANGED);

    assert_eq!(
        handle.read(sim.user_memory.as_ref(), UserPtr::null(), 1, 1),
        Err(Errno::InvalidArgument)
    );
    // The change is still pending
    assert_eq!(handle.poll(None), PollMask::readable());
}
