//! Kernel Client Interface Tests
//!
//! Validates sessions opened by other kernel components.

use kernel_api::CommandId;
use services_guest_device::{DispatchOutcome, SessionOrigin, Status, IDC_VERSION};
use tests_guest_device::{load, test_bootstrap, CoreCall};

/// Test: Open, call and close through the kernel interface
///
/// This validates that:
/// 1. The session is created with kernel origin
/// 2. Calls use the kernel buffer in place and return the raw status
/// 3. Close releases the session and is idempotent
#[test]
fn test_kernel_session_lifecycle() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");

    let mut conn = driver.idc_open().expect("Failed to open kernel session");
    assert_eq!(conn.version(), IDC_VERSION);
    assert_eq!(
        core.count(|c| matches!(c, CoreCall::CreateSession(_, SessionOrigin::Kernel))),
        1
    );

    core.respond_with(|_, buf| {
        buf.copy_from_slice(&[0x5a; 12]);
        DispatchOutcome::new(Status::HGCM_ASYNC_EXECUTE, 12)
    });
    let mut buf = [0u8; 12];
    let (status, len) = conn.call(CommandId::read_write(b'V', 7, 12), &mut buf);
    assert_eq!(status, Status::HGCM_ASYNC_EXECUTE);
    assert_eq!(len, 12);
    assert_eq!(buf, [0x5a; 12]);

    // No user copies were involved
    assert_eq!(sim.user_memory.copies_in(), 0);
    assert_eq!(sim.allocator.allocations(), 0);

    assert_eq!(conn.close(), Status::SUCCESS);
    assert_eq!(conn.close(), Status::SUCCESS);
    assert_eq!(core.live_sessions(), 0);
    assert!(conn.is_closed());
}

/// Test: Failure statuses are passed through untranslated
#[test]
fn test_failure_status_passes_through() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let conn = driver.idc_open().expect("Failed to open kernel session");

    core.reply(Status(-4242), &[1, 2, 3]);
    let mut buf = [0u8; 8];
    assert_eq!(
        conn.call(CommandId::read_write(b'V', 7, 8), &mut buf),
        (Status(-4242), 0)
    );
    // Not counted: the caller sees the status itself
    assert_eq!(driver.stats().unrecognized_statuses, 0);
}

/// Test: Overlong output is clamped to the kernel buffer
#[test]
fn test_kernel_output_is_clamped() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let conn = driver.idc_open().expect("Failed to open kernel session");

    core.reply(Status::SUCCESS, &[3; 32]);
    let mut buf = [0u8; 8];
    let (status, len) = conn.call(CommandId::read_write(b'V', 7, 8), &mut buf);
    assert_eq!(status, Status::SUCCESS);
    assert_eq!(len, 8);
    assert_eq!(driver.stats().protocol_violations, 1);
}

/// Test: Session creation failure is reported as a status
#[test]
fn test_open_failure_returns_status() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    core.fail_sessions(Status::NO_MEMORY);

    match driver.idc_open() {
        Err(status) => assert_eq!(status, Status::NO_MEMORY),
        Ok(_) => panic!("Kernel session should not open"),
    }
    assert_eq!(driver.stats().sessions_open, 0);
}

/// Test: Dropping a connection closes its session
#[test]
fn test_drop_closes_session() {
    let (sim, core) = test_bootstrap();
    let driver = load(&sim, &core).expect("Failed to load driver");
    let conn = driver.idc_open().expect("Failed to open kernel session");
    assert_eq!(driver.stats().sessions_open, 1);

    drop(conn);
    assert_eq!(driver.stats().sessions_open, 0);
    assert_eq!(core.live_sessions(), 0);
}
