//! Device node multiplexer
//!
//! Two nodes front the same session machinery: the restricted node, which
//! may be bound to a fixed major, and the user node, open to every local
//! user. They are published together or not at all.

use crate::config::DriverConfig;
use core_types::NodeId;
use hal::{NodeRegistry, NodeSpec};
use kernel_api::Errno;
use log::error;
use std::fmt;
use std::sync::Arc;

/// Which node a handle was opened through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Restricted,
    User,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Restricted => write!(f, "restricted"),
            NodeKind::User => write!(f, "user"),
        }
    }
}

/// A published node; dropping it withdraws the node
pub struct RegisteredNode {
    registry: Arc<dyn NodeRegistry>,
    id: NodeId,
    kind: NodeKind,
    spec: NodeSpec,
}

impl RegisteredNode {
    fn register(registry: &Arc<dyn NodeRegistry>, kind: NodeKind, spec: NodeSpec) -> Result<Self, Errno> {
        let id = registry.register(&spec).map_err(|errno| {
            error!(target: crate::LOG_TARGET, "registering {} node {} failed: {}", kind, spec, errno);
            errno
        })?;
        Ok(Self {
            registry: registry.clone(),
            id,
            kind,
            spec,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }
}

impl Drop for RegisteredNode {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

/// Both nodes of the driver
pub struct DeviceNodes {
    // Field order is teardown order.
    user: RegisteredNode,
    restricted: RegisteredNode,
}

impl DeviceNodes {
    /// Publishes the restricted node, then the user node
    ///
    /// If the user node cannot be published the restricted node is
    /// withdrawn before the error is returned.
    pub fn register(registry: Arc<dyn NodeRegistry>, config: &DriverConfig) -> Result<Self, Errno> {
        let restricted_spec = if config.major > 0 {
            NodeSpec::with_major(config.device_name.as_str(), config.major)
        } else {
            NodeSpec::dynamic(config.device_name.as_str())
        };
        let restricted = RegisteredNode::register(&registry, NodeKind::Restricted, restricted_spec)?;
        let user = RegisteredNode::register(
            &registry,
            NodeKind::User,
            NodeSpec::dynamic(config.user_device_name.as_str()),
        )?;
        Ok(Self { user, restricted })
    }

    pub fn get(&self, kind: NodeKind) -> &RegisteredNode {
        match kind {
            NodeKind::Restricted => &self.restricted,
            NodeKind::User => &self.user,
        }
    }

    /// Resolves a node name to the node it names
    pub fn lookup(&self, name: &str) -> Option<NodeKind> {
        [&self.restricted, &self.user]
            .into_iter()
            .find(|node| node.spec.name == name)
            .map(|node| node.kind)
    }
}
