//! Command transport
//!
//! Moves one command between caller memory and the dispatcher:
//!
//! 1. stage a buffer of exactly the size encoded in the command identifier
//! 2. copy the caller's input in
//! 3. dispatch
//! 4. copy the (possibly shorter) output back, or translate the failure
//!
//! Small requests are staged inline and never allocate. Larger ones take
//! one buffer from the platform's staging allocator, handed back when the
//! [`CommandEnvelope`] drops.

use crate::dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::extension::DeviceExtension;
use crate::session::Session;
use crate::status::Translation;
use hal::StagingAllocator;
use kernel_api::{CommandId, Errno, UserMemory, UserPtr};
use log::{debug, error, trace};

/// Requests up to this size are staged without allocating
pub const INLINE_CAPACITY: usize = 32;

#[derive(Clone, Copy)]
#[repr(C, align(8))]
struct InlineBuffer([u8; INLINE_CAPACITY]);

enum Staging<'a> {
    Inline(InlineBuffer),
    Heap {
        buf: Option<Box<[u8]>>,
        allocator: &'a dyn StagingAllocator,
    },
}

/// A staged command: identifier, length and the buffer holding its bytes
pub struct CommandEnvelope<'a> {
    command: CommandId,
    len: usize,
    staging: Staging<'a>,
}

impl<'a> CommandEnvelope<'a> {
    /// Stages a zeroed buffer sized by `command`
    pub fn stage(
        command: CommandId,
        allocator: &'a dyn StagingAllocator,
    ) -> Result<Self, Errno> {
        let len = command.size();
        let staging = if len <= INLINE_CAPACITY {
            Staging::Inline(InlineBuffer([0; INLINE_CAPACITY]))
        } else {
            Staging::Heap {
                buf: Some(allocator.allocate(len)?),
                allocator,
            }
        };
        Ok(Self {
            command,
            len,
            staging,
        })
    }

    pub fn command(&self) -> CommandId {
        self.command
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.staging, Staging::Inline(_))
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.staging {
            Staging::Inline(inline) => &inline.0[..self.len],
            Staging::Heap { buf, .. } => buf.as_deref().unwrap_or_default(),
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.staging {
            Staging::Inline(inline) => &mut inline.0[..self.len],
            Staging::Heap { buf, .. } => buf.as_deref_mut().unwrap_or_default(),
        }
    }
}

impl Drop for CommandEnvelope<'_> {
    fn drop(&mut self) {
        if let Staging::Heap { buf, allocator } = &mut self.staging {
            if let Some(buf) = buf.take() {
                allocator.free(buf);
            }
        }
    }
}

/// Clamps a reported output length to the staged capacity
///
/// An overlong report is a protocol violation by the dispatcher; it is
/// logged and counted, never fatal.
pub(crate) fn clamp_output(ext: &DeviceExtension, outcome: &DispatchOutcome, capacity: usize) -> usize {
    if outcome.output_len <= capacity {
        return outcome.output_len;
    }
    error!(
        target: crate::LOG_TARGET,
        "{}: too much output data {} expected {}",
        ext.name(),
        outcome.output_len,
        capacity
    );
    ext.stats().protocol_violation();
    capacity
}

/// Everything one command call needs
pub struct CommandTransport<'a> {
    ext: &'a DeviceExtension,
    dispatcher: &'a dyn CommandDispatcher,
    allocator: &'a dyn StagingAllocator,
    memory: &'a dyn UserMemory,
}

impl<'a> CommandTransport<'a> {
    pub fn new(
        ext: &'a DeviceExtension,
        dispatcher: &'a dyn CommandDispatcher,
        allocator: &'a dyn StagingAllocator,
        memory: &'a dyn UserMemory,
    ) -> Self {
        Self {
            ext,
            dispatcher,
            allocator,
            memory,
        }
    }

    /// Runs `command` with its argument block at `arg`
    ///
    /// Returns the number of bytes copied back to `arg`.
    pub fn dispatch(&self, session: &Session, command: CommandId, arg: UserPtr) -> Result<usize, Errno> {
        let name = self.ext.name();
        trace!(target: crate::LOG_TARGET, "{}: {} command {} arg {}", name, session.id(), command, arg);

        let mut envelope = CommandEnvelope::stage(command, self.allocator).map_err(|errno| {
            error!(
                target: crate::LOG_TARGET,
                "{}: failed to allocate {} bytes for {}",
                name,
                command.size(),
                command
            );
            errno
        })?;

        if let Err(fault) = self.memory.copy_from_user(envelope.as_mut_slice(), arg) {
            debug!(
                target: crate::LOG_TARGET,
                "{}: copy_from_user failed for {}: {}",
                name,
                command,
                fault
            );
            self.ext.stats().transfer_fault();
            return Err(fault.into());
        }

        let outcome = self
            .dispatcher
            .dispatch(self.ext, session.id(), command, envelope.as_mut_slice());

        match outcome.status.translate() {
            Translation::Success => {
                let returned = clamp_output(self.ext, &outcome, envelope.len());
                if returned > 0 {
                    if let Err(fault) = self.memory.copy_to_user(arg, &envelope.as_slice()[..returned]) {
                        error!(
                            target: crate::LOG_TARGET,
                            "{}: copy_to_user failed; arg {} returned {} command {}",
                            name,
                            arg,
                            returned,
                            command
                        );
                        self.ext.stats().transfer_fault();
                        return Err(fault.into());
                    }
                }
                Ok(returned)
            }
            Translation::Failure(errno) => {
                trace!(target: crate::LOG_TARGET, "{}: {} failed: {}", name, command, outcome.status);
                Err(errno)
            }
            Translation::Fallback(errno) => {
                error!(
                    target: crate::LOG_TARGET,
                    "{}: unhandled status {} from {}",
                    name,
                    outcome.status,
                    command
                );
                self.ext.stats().unrecognized_status();
                Err(errno)
            }
        }
    }
}
