//! Simulated device node registry

use crate::fault_injection::SharedFaults;
use crate::resource_audit::{ResourceEvent, SharedAudit};
use core_types::NodeId;
use hal::{NodeNumber, NodeRegistry, NodeSpec};
use kernel_api::Errno;
use std::sync::{Mutex, MutexGuard};

/// In-process node registry
#[derive(Debug)]
pub struct SimNodeRegistry {
    nodes: Mutex<Vec<(NodeId, NodeSpec)>>,
    faults: SharedFaults,
    audit: SharedAudit,
}

impl SimNodeRegistry {
    pub fn new(faults: SharedFaults, audit: SharedAudit) -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            faults,
            audit,
        }
    }

    /// Publishes a node owned by someone else, bypassing audit and faults
    pub fn occupy(&self, spec: NodeSpec) -> NodeId {
        let id = NodeId::new();
        self.lock().push((id, spec));
        id
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().iter().any(|(_, spec)| spec.name == name)
    }

    /// Spec of the node published under `name`
    pub fn spec(&self, name: &str) -> Option<NodeSpec> {
        self.lock()
            .iter()
            .find(|(_, spec)| spec.name == name)
            .map(|(_, spec)| spec.clone())
    }

    pub fn node_names(&self) -> Vec<String> {
        self.lock().iter().map(|(_, spec)| spec.name.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(NodeId, NodeSpec)>> {
        match self.nodes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl NodeRegistry for SimNodeRegistry {
    fn register(&self, spec: &NodeSpec) -> Result<NodeId, Errno> {
        if let Some(errno) = self.faults.with(|plan| plan.node_failure(&spec.name)) {
            return Err(errno);
        }
        let mut nodes = self.lock();
        let clash = nodes.iter().any(|(_, existing)| {
            existing.name == spec.name
                || matches!(
                    (existing.number, spec.number),
                    (NodeNumber::Major(a), NodeNumber::Major(b)) if a == b
                )
        });
        if clash {
            return Err(Errno::Busy);
        }
        let id = NodeId::new();
        nodes.push((id, spec.clone()));
        drop(nodes);
        self.audit.record(ResourceEvent::NodeRegistered {
            id,
            name: spec.name.clone(),
        });
        Ok(id)
    }

    fn deregister(&self, id: NodeId) {
        let mut nodes = self.lock();
        let removed = nodes
            .iter()
            .position(|(node, _)| *node == id)
            .map(|pos| nodes.remove(pos));
        drop(nodes);
        if let Some((id, spec)) = removed {
            self.audit.record(ResourceEvent::NodeDeregistered {
                id,
                name: spec.name,
            });
        }
    }
}
