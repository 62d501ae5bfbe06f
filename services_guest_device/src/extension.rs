//! The device extension: state shared by the interrupt bridge and every
//! open handle for as long as the driver is loaded.

use crate::notify::Broadcaster;
use hal::PciAddress;
use serde::Serialize;
use spin::{RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Guest OS type reported to the common layer at device init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Linux26,
    Linux26X64,
}

impl OsType {
    /// The type matching the build target
    pub const fn current() -> Self {
        if cfg!(target_pointer_width = "64") {
            OsType::Linux26X64
        } else {
            OsType::Linux26
        }
    }

    pub const fn raw(self) -> u32 {
        match self {
            OsType::Linux26 => 0x56000,
            OsType::Linux26X64 => 0x56100,
        }
    }
}

/// Memory-mapped register window as seen by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MmioInfo {
    pub phys: u64,
    pub len: u64,
    pub virt: usize,
}

/// Copy of the bus resources taken when the device was acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub address: PciAddress,
    pub io_base: u16,
    pub io_len: u16,
    pub mmio: Option<MmioInfo>,
    pub irq: u32,
}

/// Counters kept for diagnostics
#[derive(Debug, Default)]
pub struct DriverStats {
    interrupts_handled: AtomicU64,
    interrupts_spurious: AtomicU64,
    protocol_violations: AtomicU64,
    unrecognized_statuses: AtomicU64,
    transfer_faults: AtomicU64,
    sessions_open: AtomicU64,
}

/// Point-in-time copy of [`DriverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub interrupts_handled: u64,
    pub interrupts_spurious: u64,
    pub protocol_violations: u64,
    pub unrecognized_statuses: u64,
    pub transfer_faults: u64,
    pub sessions_open: u64,
}

impl DriverStats {
    pub(crate) fn interrupt_handled(&self) {
        self.interrupts_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn interrupt_spurious(&self) {
        self.interrupts_spurious.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unrecognized_status(&self) {
        self.unrecognized_statuses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transfer_fault(&self) {
        self.transfer_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_opened(&self) {
        self.sessions_open.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_closed(&self) {
        self.sessions_open.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            interrupts_handled: self.interrupts_handled.load(Ordering::Relaxed),
            interrupts_spurious: self.interrupts_spurious.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            unrecognized_statuses: self.unrecognized_statuses.load(Ordering::Relaxed),
            transfer_faults: self.transfer_faults.load(Ordering::Relaxed),
            sessions_open: self.sessions_open.load(Ordering::Relaxed),
        }
    }
}

/// Shared device state
///
/// The sequence counter is written only by the interrupt bridge. Every
/// other reader compares it against a session's last-seen value.
///
/// The extension outlives the driver when handles are still open, but the
/// common layer does not: every call into it holds [`DeviceExtension::hold`],
/// and unloading [`retires`](DeviceExtension::retire) the extension before
/// the device is terminated.
pub struct DeviceExtension {
    name: String,
    live: RwLock<bool>,
    snapshot: DeviceSnapshot,
    os_type: OsType,
    event_mask: u32,
    sequence: AtomicU32,
    broadcaster: Broadcaster,
    stats: DriverStats,
}

impl DeviceExtension {
    pub fn new(name: impl Into<String>, snapshot: DeviceSnapshot, os_type: OsType) -> Self {
        Self {
            name: name.into(),
            live: RwLock::new(true),
            snapshot,
            os_type,
            event_mask: crate::EVENT_MOUSE_POSITION_CHANGED,
            sequence: AtomicU32::new(0),
            broadcaster: Broadcaster::new(),
            stats: DriverStats::default(),
        }
    }

    /// Name of the restricted node, used as log prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    pub fn os_type(&self) -> OsType {
        self.os_type
    }

    /// Events the driver asks the common layer to report
    pub fn event_mask(&self) -> u32 {
        self.event_mask
    }

    /// Current value of the sequence counter
    pub fn sequence(&self) -> u32 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Advances the counter, wrapping at `u32::MAX`
    pub(crate) fn bump_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// False once the driver has started unloading
    pub fn is_live(&self) -> bool {
        *self.live.read()
    }

    /// Keeps the device from being retired while the guard is held
    ///
    /// `None` once retired.
    pub(crate) fn hold(&self) -> Option<RwLockReadGuard<'_, bool>> {
        let guard = self.live.read();
        if *guard {
            Some(guard)
        } else {
            None
        }
    }

    /// Refuses new calls into the common layer, waiting out calls in flight
    ///
    /// Blocked waiters are woken so they can see the device is gone.
    /// Returns whether the extension was live.
    pub(crate) fn retire(&self) -> bool {
        let was_live = std::mem::replace(&mut *self.live.write(), false);
        self.broadcaster.wake_all();
        was_live
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    #[cfg(test)]
    pub(crate) fn set_sequence(&self, value: u32) {
        self.sequence.store(value, Ordering::Release);
    }
}

impl std::fmt::Debug for DeviceExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceExtension")
            .field("name", &self.name)
            .field("snapshot", &self.snapshot)
            .field("os_type", &self.os_type)
            .field("sequence", &self.sequence())
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_wraps() {
        let ext = test_support::extension();
        ext.set_sequence(u32::MAX);
        assert_eq!(ext.bump_sequence(), 0);
        assert_eq!(ext.sequence(), 0);
    }

    #[test]
    fn test_retire_refuses_new_holds() {
        let ext = test_support::extension();
        assert!(ext.is_live());
        assert!(ext.hold().is_some());

        assert!(ext.retire());
        assert!(!ext.is_live());
        assert!(ext.hold().is_none());
        assert!(!ext.retire());
    }

    #[test]
    fn test_retire_waits_for_holders() {
        use std::sync::mpsc;
        use std::sync::Arc;
        use std::thread;

        let ext = Arc::new(test_support::extension());
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let holder = {
            let ext = ext.clone();
            thread::spawn(move || {
                let _guard = ext.hold().unwrap();
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };
        held_rx.recv().unwrap();

        let retirer = {
            let ext = ext.clone();
            thread::spawn(move || ext.retire())
        };
        // Still held, so still live
        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!retirer.is_finished());

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(retirer.join().unwrap());
        assert!(!ext.is_live());
    }

    #[test]
    fn test_event_mask_is_pointer_change() {
        let ext = test_support::extension();
        assert_eq!(ext.event_mask(), 1 << 9);
    }

    #[test]
    fn test_stats_snapshot_serializes() {
        let stats = DriverStats::default();
        stats.interrupt_handled();
        stats.session_opened();
        stats.session_opened();
        stats.session_closed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.interrupts_handled, 1);
        assert_eq!(snapshot.sessions_open, 1);

        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["interrupts_handled"], 1);
        assert_eq!(json["transfer_faults"], 0);
    }

    #[test]
    fn test_os_type_matches_pointer_width() {
        let os = OsType::current();
        if cfg!(target_pointer_width = "64") {
            assert_eq!(os.raw(), 0x56100);
        } else {
            assert_eq!(os.raw(), 0x56000);
        }
    }
}
