//! Device node publication
//!
//! A device node is a named access point through which processes open
//! handles on a driver. Nodes are either bound to a fixed major number or
//! receive a dynamically assigned minor number.

use core_types::NodeId;
use kernel_api::Errno;
use std::fmt;

/// How a node is numbered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeNumber {
    /// Dynamically assigned minor
    Dynamic,
    /// Fixed character-device major
    Major(u32),
}

/// What to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: String,
    pub number: NodeNumber,
}

impl NodeSpec {
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number: NodeNumber::Dynamic,
        }
    }

    pub fn with_major(name: impl Into<String>, major: u32) -> Self {
        Self {
            name: name.into(),
            number: NodeNumber::Major(major),
        }
    }
}

impl fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            NodeNumber::Dynamic => write!(f, "{} (dynamic)", self.name),
            NodeNumber::Major(major) => write!(f, "{} (major {})", self.name, major),
        }
    }
}

/// Node publication services
pub trait NodeRegistry: Send + Sync {
    /// Publishes a node; fails with [`Errno::Busy`] on a name or number clash
    fn register(&self, spec: &NodeSpec) -> Result<NodeId, Errno>;

    /// Withdraws a published node
    fn deregister(&self, id: NodeId);
}
