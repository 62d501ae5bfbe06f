//! Open handles
//!
//! A [`Handle`] is what a process holds after opening one of the device
//! nodes. Every file operation the nodes support goes through it: command
//! calls, poll, read and asynchronous subscription. Both nodes hand out the
//! same kind of handle.

use crate::nodes::NodeKind;
use crate::notify::{PollMask, PollTable, SignalTarget, WaitCancel};
use crate::session::{Session, SessionManager, SessionOrigin};
use crate::status::Status;
use crate::transport::CommandTransport;
use bitflags::bitflags;
use core_types::SessionId;
use hal::StagingAllocator;
use kernel_api::{CommandId, Errno, UserMemory, UserPtr};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

bitflags! {
    /// Flags given at open
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        /// Reads never block
        const NONBLOCK = 0o4000;
    }
}

/// One open handle on a device node
pub struct Handle {
    kind: NodeKind,
    flags: OpenFlags,
    session: Option<Session>,
    sessions: SessionManager,
    allocator: Arc<dyn StagingAllocator>,
    cancel: WaitCancel,
}

impl Handle {
    pub(crate) fn open(
        kind: NodeKind,
        flags: OpenFlags,
        sessions: SessionManager,
        allocator: Arc<dyn StagingAllocator>,
    ) -> Result<Self, Status> {
        let session = sessions.open(SessionOrigin::User(kind))?;
        Ok(Self {
            kind,
            flags,
            session: Some(session),
            sessions,
            allocator,
            cancel: WaitCancel::new(),
        })
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(Session::id)
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    fn session(&self) -> Result<&Session, Errno> {
        self.session.as_ref().ok_or(Errno::BadHandle)
    }

    /// Issues `command` with its argument block at `arg`
    ///
    /// Returns the number of bytes copied back.
    pub fn ioctl(&self, memory: &dyn UserMemory, command: CommandId, arg: UserPtr) -> Result<usize, Errno> {
        let session = self.session()?;
        let _live = self.sessions.extension().hold().ok_or(Errno::NoDevice)?;
        CommandTransport::new(
            self.sessions.extension(),
            self.sessions.dispatcher().as_ref(),
            self.allocator.as_ref(),
            memory,
        )
        .dispatch(session, command, arg)
    }

    /// Readiness of the handle, joining the wait queue through `table`
    ///
    /// The queue is joined before readiness is sampled. Calling poll again
    /// without an intervening interrupt gives the same answer.
    pub fn poll<'h>(&'h self, table: Option<&mut PollTable<'h>>) -> PollMask {
        let Some(session) = self.session.as_ref() else {
            return PollMask::empty();
        };
        let ext = self.sessions.extension();
        if let Some(table) = table {
            table.wait_on(ext.broadcaster().queue());
        }
        if !ext.is_live() {
            return PollMask::hangup();
        }
        if session.is_stale(ext.sequence()) {
            PollMask::readable()
        } else {
            PollMask::empty()
        }
    }

    /// Blocks until the handle is readable
    ///
    /// `Ok(false)` means the timeout expired first. A wait in progress when
    /// the driver unloads ends with [`Errno::NoDevice`].
    pub fn wait_ready(&self, timeout: Option<Duration>) -> Result<bool, Errno> {
        let session = self.session()?;
        let ext = self.sessions.extension();
        if !ext.is_live() {
            return Err(Errno::NoDevice);
        }
        let ready = ext.broadcaster().wait_until(&self.cancel, timeout, || {
            !ext.is_live() || session.is_stale(ext.sequence())
        })?;
        if !ext.is_live() {
            return Err(Errno::NoDevice);
        }
        Ok(ready)
    }

    /// Reads the change sentinel
    ///
    /// A stale handle yields a single zero byte and catches up with the
    /// counter. Otherwise non-blocking handles read nothing and blocking
    /// handles wait for the next change.
    pub fn read(&self, memory: &dyn UserMemory, buf: UserPtr, len: usize, offset: u64) -> Result<usize, Errno> {
        let session = self.session()?;
        if offset != 0 {
            return Err(Errno::InvalidArgument);
        }
        if len == 0 {
            return Ok(0);
        }
        let ext = self.sessions.extension();
        loop {
            if !ext.is_live() {
                return Err(Errno::NoDevice);
            }
            let current = ext.sequence();
            if session.is_stale(current) {
                memory.copy_to_user(buf, &[0u8])?;
                session.consume(current);
                return Ok(1);
            }
            if self.flags.contains(OpenFlags::NONBLOCK) {
                return Ok(0);
            }
            self.wait_ready(None)?;
        }
    }

    /// Turns asynchronous notification on or off
    ///
    /// Turning it on requires a target and replaces any earlier one.
    pub fn fasync(&self, on: bool, target: Option<Arc<dyn SignalTarget>>) -> Result<(), Errno> {
        let session = self.session()?;
        let subscribers = self.sessions.extension().broadcaster().subscribers();
        if on {
            let target = target.ok_or(Errno::InvalidArgument)?;
            if !self.sessions.extension().is_live() {
                return Err(Errno::NoDevice);
            }
            subscribers.subscribe(session.id(), target);
        } else {
            subscribers.unsubscribe(session.id());
        }
        Ok(())
    }

    /// Interrupts the current blocking wait, or the next one if none is running
    pub fn cancel_waits(&self) {
        self.cancel.cancel();
    }

    /// Releases the session; later calls do nothing
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(
                target: crate::LOG_TARGET,
                "{}: releasing {} handle",
                self.sessions.extension().name(),
                self.kind
            );
            self.sessions.close(session);
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}
