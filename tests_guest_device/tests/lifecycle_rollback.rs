//! Load and Unload Tests
//!
//! Validates that loading is all-or-nothing and that both a failed load
//! and a regular unload release every resource in reverse order.

use kernel_api::{CommandId, Errno};
use services_guest_device::{DriverConfig, DriverState, LoadError, NodeKind, OpenFlags, PollMask, Status};
use sim_kernel::fault_injection::{FaultPlan, PlatformFault};
use sim_kernel::resource_audit::ResourceKind;
use sim_kernel::test_utils::{caller_buffer, device_without_mmio, STANDARD_ID, STANDARD_MMIO_BASE};
use sim_kernel::SimPlatform;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tests_guest_device::{load, load_with, test_bootstrap, CoreCall, ScriptedCore, ARG, IRQ};

const FULL_ORDER: [ResourceKind; 7] = [
    ResourceKind::DeviceReference,
    ResourceKind::DeviceEnable,
    ResourceKind::MemRegion,
    ResourceKind::MmioMapping,
    ResourceKind::IrqRegistration,
    ResourceKind::DeviceNode,
    ResourceKind::DeviceNode,
];

fn assert_reverse_teardown(sim: &SimPlatform) {
    let audit = sim.audit();
    assert!(audit.is_balanced(), "leaked: {:?}", audit.live_resources());
    let mut expected = audit.acquisition_order();
    expected.reverse();
    assert_eq!(audit.release_order(), expected);
}

/// Test: A full load followed by unload
///
/// This validates that:
/// 1. Every stage is reached in order
/// 2. Both nodes and the shared interrupt are published
/// 3. Unload releases everything in exact reverse order
#[test]
fn test_load_then_unload_reverses_everything() {
    let (sim, core) = test_bootstrap();

    let driver = load(&sim, &core).expect("Failed to load driver");
    assert_eq!(driver.state(), DriverState::Running);
    assert_eq!(sim.audit().acquisition_order(), FULL_ORDER.to_vec());
    assert_eq!(sim.interrupts.handler_names(IRQ), vec!["vboxguest".to_string()]);
    assert_eq!(sim.nodes.node_names(), vec!["vboxguest", "vboxuser"]);
    assert_eq!(
        sim.pci.region_owner(STANDARD_MMIO_BASE).as_deref(),
        Some("vboxguest")
    );

    driver.unload();

    assert_reverse_teardown(&sim);
    assert!(sim.nodes.node_names().is_empty());
    assert_eq!(sim.pci.mapping_count(), 0);
    assert_eq!(core.calls(), vec![CoreCall::InitDevice, CoreCall::TermDevice]);
}

/// Test: Every bus-level failure aborts the load cleanly
#[test]
fn test_bus_failures_roll_back() {
    let cases = [
        (PlatformFault::DeviceAbsent, Errno::NoDevice),
        (PlatformFault::EnableFails(Errno::Io), Errno::Io),
        (PlatformFault::IoPortMissing, Errno::NoDeviceOrAddress),
        (PlatformFault::MemRegionBusy, Errno::Busy),
        (PlatformFault::RemapFails, Errno::OutOfMemory),
    ];

    for (fault, errno) in cases {
        let (sim, core) = test_bootstrap();
        sim.set_fault_plan(FaultPlan::new().with_fault(fault.clone()));

        let err = load(&sim, &core).expect_err("Load should fail");
        assert!(matches!(err, LoadError::Resources(_)), "{:?}", fault);
        assert_eq!(err.errno(), errno, "{:?}", fault);
        assert_eq!(err.reached(), DriverState::Unloaded);
        assert_reverse_teardown(&sim);
        assert!(core.calls().is_empty(), "{:?} reached the common layer", fault);
    }
}

/// Test: Interrupt registration failure releases the bus resources
#[test]
fn test_interrupt_failure_rolls_back() {
    let (sim, core) = test_bootstrap();
    sim.set_fault_plan(FaultPlan::new().with_fault(PlatformFault::IrqRequestFails(Errno::Busy)));

    let err = load(&sim, &core).expect_err("Load should fail");
    assert_eq!(err, LoadError::Interrupt(Errno::Busy));
    assert_eq!(err.reached(), DriverState::ResourcesAcquired);
    assert_reverse_teardown(&sim);
    assert_eq!(
        sim.audit().release_order(),
        vec![
            ResourceKind::MmioMapping,
            ResourceKind::MemRegion,
            ResourceKind::DeviceEnable,
            ResourceKind::DeviceReference,
        ]
    );
}

/// Test: Device initialization failure uninstalls the interrupt
#[test]
fn test_device_init_failure_rolls_back() {
    let (sim, core) = test_bootstrap();
    core.fail_init(Status::NO_MEMORY);

    let err = load(&sim, &core).expect_err("Load should fail");
    assert_eq!(err, LoadError::DeviceInit(Status::NO_MEMORY));
    assert_eq!(err.errno(), Errno::OutOfMemory);
    assert_reverse_teardown(&sim);
    assert_eq!(sim.interrupts.handler_count(IRQ), 0);
    // Nothing to terminate: initialization never succeeded
    assert_eq!(core.count(|c| *c == CoreCall::TermDevice), 0);
}

/// Test: User node failure withdraws the restricted node and everything below
///
/// This validates that:
/// 1. The restricted node is withdrawn before the error surfaces
/// 2. The device is terminated while the interrupt is still installed
/// 3. The audit records reverse teardown
#[test]
fn test_user_node_failure_rolls_back() {
    let (sim, core) = test_bootstrap();
    sim.set_fault_plan(FaultPlan::new().with_fault(PlatformFault::NodeRegistrationFails {
        name: "vboxuser".to_string(),
        errno: Errno::OutOfMemory,
    }));

    let handlers_at_term = Arc::new(AtomicUsize::new(usize::MAX));
    {
        let sim = sim.clone();
        let seen = handlers_at_term.clone();
        core.on_term(move || {
            seen.store(sim.interrupts.handler_count(IRQ), Ordering::SeqCst);
        });
    }

    let err = load(&sim, &core).expect_err("Load should fail");
    assert_eq!(err, LoadError::Nodes(Errno::OutOfMemory));
    assert_eq!(err.reached(), DriverState::InterruptInstalled);
    assert_eq!(handlers_at_term.load(Ordering::SeqCst), 1);
    assert_reverse_teardown(&sim);
    assert!(sim.nodes.node_names().is_empty());
}

/// Test: Unload terminates the device before the interrupt goes away
#[test]
fn test_unload_terminates_before_uninstall() {
    let (sim, core) = test_bootstrap();
    let handlers_at_term = Arc::new(AtomicUsize::new(usize::MAX));
    let nodes_at_term = Arc::new(AtomicUsize::new(usize::MAX));
    {
        let sim = sim.clone();
        let handlers = handlers_at_term.clone();
        let nodes = nodes_at_term.clone();
        core.on_term(move || {
            handlers.store(sim.interrupts.handler_count(IRQ), Ordering::SeqCst);
            nodes.store(sim.nodes.node_names().len(), Ordering::SeqCst);
        });
    }

    load(&sim, &core).expect("Failed to load driver").unload();

    assert_eq!(handlers_at_term.load(Ordering::SeqCst), 1);
    assert_eq!(nodes_at_term.load(Ordering::SeqCst), 0);
}

/// Test: A device without a register window still loads
#[test]
fn test_load_without_mmio() {
    let sim = SimPlatform::new().with_device(device_without_mmio(STANDARD_ID));
    let core = ScriptedCore::new();

    let driver = load(&sim, &core).expect("Failed to load driver");
    assert_eq!(driver.resources().mmio(), None);
    assert_eq!(driver.extension().snapshot().mmio, None);
    assert_eq!(sim.audit().live(ResourceKind::MemRegion), 0);

    drop(driver);
    assert_reverse_teardown(&sim);
}

/// Test: Fixed major for the restricted node
#[test]
fn test_fixed_major() {
    let (sim, core) = test_bootstrap();
    let config = DriverConfig {
        major: 241,
        ..DriverConfig::default()
    };

    let driver = load_with(&sim, &core, config).expect("Failed to load driver");
    assert_eq!(
        sim.nodes.spec("vboxguest").expect("Node missing").number,
        hal::NodeNumber::Major(241)
    );
    assert_eq!(driver.config().major, 241);
}

/// Test: A second instance cannot claim the same device
#[test]
fn test_second_load_conflicts() {
    let (sim, core) = test_bootstrap();
    let first = load(&sim, &core).expect("Failed to load driver");

    let second_core = ScriptedCore::new();
    let err = load_with(
        &sim,
        &second_core,
        DriverConfig {
            device_name: "vboxguest2".to_string(),
            user_device_name: "vboxuser2".to_string(),
            ..DriverConfig::default()
        },
    )
    .expect_err("Second load should fail");
    assert_eq!(err.errno(), Errno::Busy);

    // The first instance is untouched
    assert_eq!(first.state(), DriverState::Running);
    assert_eq!(sim.interrupts.handler_count(IRQ), 1);
    assert_eq!(
        sim.pci.region_owner(STANDARD_MMIO_BASE).as_deref(),
        Some("vboxguest")
    );

    drop(first);
    assert_reverse_teardown(&sim);
}

/// Test: Unloading with handles and kernel connections still open
///
/// This validates that:
/// 1. Unload still releases everything in reverse order
/// 2. Nothing reaches the common layer once the device is terminated
/// 3. Surviving handles report the device as gone
/// 4. Closing them afterwards releases only the driver side
#[test]
fn test_unload_with_open_handle() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let mut handle = driver
        .open(NodeKind::User, OpenFlags::empty())
        .expect("Failed to open handle");
    let mut conn = driver.idc_open().expect("Failed to open kernel session");
    caller_buffer(&sim.user_memory, ARG.addr(), &[0; 16]);
    let ext = driver.extension().clone();

    driver.unload();
    assert_reverse_teardown(&sim);
    assert_eq!(core.live_sessions(), 0);

    assert_eq!(
        handle.ioctl(sim.user_memory.as_ref(), CommandId::read_write(b'V', 3, 16), ARG),
        Err(Errno::NoDevice)
    );
    assert_eq!(
        handle.read(sim.user_memory.as_ref(), ARG, 1, 0),
        Err(Errno::NoDevice)
    );
    assert_eq!(handle.poll(None), PollMask::hangup());
    let mut buf = [0u8; 16];
    assert_eq!(
        conn.call(CommandId::read_write(b'V', 3, 16), &mut buf),
        (Status::INVALID_HANDLE, 0)
    );

    handle.close();
    handle.close();
    assert_eq!(conn.close(), Status::SUCCESS);
    assert_eq!(core.calls_after_term(), vec![]);
    assert_eq!(core.dispatch_count(), 0);
    assert_eq!(ext.stats().snapshot().sessions_open, 0);
}

/// Test: A reader blocked at unload time is released
#[test]
fn test_unload_releases_blocked_reader() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let handle = Arc::new(
        driver
            .open(NodeKind::Restricted, OpenFlags::empty())
            .expect("Failed to open handle"),
    );
    let queue_len = {
        let ext = driver.extension().clone();
        move || ext.broadcaster().queue().len()
    };

    let reader = {
        let handle = handle.clone();
        let memory = sim.user_memory.clone();
        thread::spawn(move || handle.read(memory.as_ref(), ARG, 1, 0))
    };
    while queue_len() == 0 {
        thread::yield_now();
    }

    driver.unload();
    assert_eq!(reader.join().expect("Reader panicked"), Err(Errno::NoDevice));
    assert_eq!(core.calls_after_term(), vec![]);
    assert_reverse_teardown(&sim);
}
