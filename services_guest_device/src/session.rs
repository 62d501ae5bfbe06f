//! Sessions and the session manager

use crate::dispatcher::CommandDispatcher;
use crate::extension::DeviceExtension;
use crate::nodes::NodeKind;
use crate::status::Status;
use core_types::SessionId;
use log::{debug, error};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Who opened a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOrigin {
    /// A process, through one of the device nodes
    User(NodeKind),
    /// Another kernel component, through the client interface
    Kernel,
}

/// Per-handle state: one caller's view of the sequence counter
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    origin: SessionOrigin,
    last_seen: AtomicU32,
}

impl Session {
    fn new(origin: SessionOrigin, current: u32) -> Self {
        Self {
            id: SessionId::new(),
            origin,
            last_seen: AtomicU32::new(current),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }

    pub fn last_seen(&self) -> u32 {
        self.last_seen.load(Ordering::Acquire)
    }

    /// True when the counter moved since this session last looked
    pub fn is_stale(&self, current: u32) -> bool {
        self.last_seen() != current
    }

    /// Advances the view to `current` if it was stale
    ///
    /// Returns whether a change was consumed.
    pub fn consume(&self, current: u32) -> bool {
        let seen = self.last_seen();
        seen != current
            && self
                .last_seen
                .compare_exchange(seen, current, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

/// Creates and destroys sessions against one device extension
#[derive(Clone)]
pub struct SessionManager {
    ext: Arc<DeviceExtension>,
    dispatcher: Arc<dyn CommandDispatcher>,
}

impl SessionManager {
    pub fn new(ext: Arc<DeviceExtension>, dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self { ext, dispatcher }
    }

    pub fn extension(&self) -> &Arc<DeviceExtension> {
        &self.ext
    }

    pub fn dispatcher(&self) -> &Arc<dyn CommandDispatcher> {
        &self.dispatcher
    }

    /// Opens a session whose view starts at the current counter
    ///
    /// Fails with the common layer's status when it cannot attach its
    /// per-session state.
    pub fn open(&self, origin: SessionOrigin) -> Result<Session, Status> {
        let Some(_live) = self.ext.hold() else {
            return Err(Status::INVALID_HANDLE);
        };
        let session = Session::new(origin, self.ext.sequence());
        let status = self.dispatcher.create_session(&self.ext, session.id, origin);
        if status.is_failure() {
            error!(
                target: crate::LOG_TARGET,
                "{}: creating {:?} session failed: {}",
                self.ext.name(),
                origin,
                status
            );
            return Err(status);
        }
        self.ext.stats().session_opened();
        debug!(
            target: crate::LOG_TARGET,
            "{}: opened {} ({:?})",
            self.ext.name(),
            session.id,
            origin
        );
        Ok(session)
    }

    /// Withdraws the session from every notification path, then releases it
    ///
    /// After the device is terminated the common layer has already dropped
    /// its per-session state, so only the driver side is released.
    pub fn close(&self, session: Session) {
        self.ext.broadcaster().subscribers().unsubscribe(session.id);
        match self.ext.hold() {
            Some(_live) => self.dispatcher.close_session(&self.ext, session.id),
            None => debug!(
                target: crate::LOG_TARGET,
                "{}: device gone, {} released locally",
                self.ext.name(),
                session.id
            ),
        }
        self.ext.stats().session_closed();
        debug!(
            target: crate::LOG_TARGET,
            "{}: closed {}",
            self.ext.name(),
            session.id
        );
    }
}
