//! # Kernel API
//!
//! This crate defines the conventions shared between callers of the guest
//! driver and the driver itself.
//!
//! ## Contents
//!
//! - [`Errno`]: the caller-facing error convention
//! - [`UserMemory`]: copy primitives for caller-owned memory
//! - [`CommandId`]: command identifiers carrying their transfer size
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A syscall table (a shim maps its calls onto these types)
//! - The guest/host protocol (commands are opaque here)

pub mod error;
pub mod ioctl;
pub mod user_memory;

pub use error::{to_raw_result, Errno};
pub use ioctl::{CommandId, IoDirection, MAX_COMMAND_SIZE};
pub use user_memory::{TransferFault, UserMemory, UserPtr};
