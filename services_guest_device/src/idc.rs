//! Kernel client interface
//!
//! Other kernel components talk to the device through an
//! [`IdcConnection`]. Buffers are kernel memory, so nothing is staged or
//! copied, and the dispatcher's status is returned as is.

use crate::session::{Session, SessionManager};
use crate::status::Status;
use crate::transport::clamp_output;
use crate::IDC_VERSION;
use kernel_api::CommandId;
use log::trace;

/// A kernel-origin session
pub struct IdcConnection {
    session: Option<Session>,
    sessions: SessionManager,
}

impl IdcConnection {
    pub(crate) fn new(session: Session, sessions: SessionManager) -> Self {
        Self {
            session: Some(session),
            sessions,
        }
    }

    /// Version of the interface
    pub fn version(&self) -> u32 {
        IDC_VERSION
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    /// Passes `buf` straight to the dispatcher
    ///
    /// Returns the dispatcher's status and the number of valid output
    /// bytes in `buf`, never more than `buf.len()`. Closed connections and
    /// connections to an unloaded driver get `INVALID_HANDLE`.
    pub fn call(&self, command: CommandId, buf: &mut [u8]) -> (Status, usize) {
        let Some(session) = self.session.as_ref() else {
            return (Status::INVALID_HANDLE, 0);
        };
        let ext = self.sessions.extension();
        let Some(_live) = ext.hold() else {
            return (Status::INVALID_HANDLE, 0);
        };
        let outcome = self
            .sessions
            .dispatcher()
            .dispatch(ext, session.id(), command, buf);
        trace!(
            target: crate::LOG_TARGET,
            "{}: kernel call {} -> {}",
            ext.name(),
            command,
            outcome.status
        );
        if outcome.status.is_failure() {
            return (outcome.status, 0);
        }
        let returned = clamp_output(ext, &outcome, buf.len());
        (outcome.status, returned)
    }

    /// Releases the session; a second close only reports success
    pub fn close(&mut self) -> Status {
        if let Some(session) = self.session.take() {
            self.sessions.close(session);
        }
        Status::SUCCESS
    }
}

impl Drop for IdcConnection {
    fn drop(&mut self) {
        self.close();
    }
}
