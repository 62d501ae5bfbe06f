//! # Core Types
//!
//! This crate defines the identifiers shared by the guest driver, its
//! hardware abstraction layer and the simulated platform.
//!
//! ## Key Types
//!
//! - [`SessionId`]: Unique identifier for a per-handle session
//! - [`NodeId`]: Unique identifier for a published device node

pub mod ids;

pub use ids::{NodeId, SessionId};
