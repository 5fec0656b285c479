use super::{ClusterMembership, MembershipError, MembershipResult};
use crate::models::{
    KeyspaceReplication, MembershipState, NodeId, NodeStatus, RingTopology, Token,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct MembershipView {
    ring: RingTopology,
    statuses: HashMap<NodeId, NodeStatus>,
    down: HashSet<NodeId>,
    keyspaces: Vec<KeyspaceReplication>,
}

/// Process-local membership view guarded by a single lock
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    view: RwLock<MembershipView>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a joined node owning `tokens`
    pub fn add_node(&self, node_id: NodeId, tokens: impl IntoIterator<Item = Token>) {
        let mut view = self.view.write();
        view.ring.assign(node_id.clone(), tokens);
        view.statuses.insert(node_id, NodeStatus::joined());
    }

    pub fn add_keyspace(&self, name: impl Into<String>, replication_factor: usize) {
        let keyspace = KeyspaceReplication::new(name, replication_factor);
        let mut view = self.view.write();
        view.keyspaces.retain(|existing| existing.name != keyspace.name);
        view.keyspaces.push(keyspace);
    }

    pub fn mark_down(&self, node_id: &NodeId) {
        debug!(node_id = %node_id, "Marking node down");
        self.view.write().down.insert(node_id.clone());
    }

    pub fn mark_up(&self, node_id: &NodeId) {
        debug!(node_id = %node_id, "Marking node up");
        self.view.write().down.remove(node_id);
    }

    /// Nodes still present in the ring
    pub fn ring_members(&self) -> Vec<NodeId> {
        self.view.read().ring.nodes().into_iter().collect()
    }

    pub fn ring_snapshot(&self) -> RingTopology {
        self.view.read().ring.clone()
    }

    pub fn replication_factor(&self, keyspace: &str) -> Option<usize> {
        self.view
            .read()
            .keyspaces
            .iter()
            .find(|existing| existing.name == keyspace)
            .map(|existing| existing.replication_factor)
    }
}

#[async_trait]
impl ClusterMembership for InMemoryMembership {
    async fn ring(&self) -> MembershipResult<RingTopology> {
        Ok(self.ring_snapshot())
    }

    async fn keyspaces(&self) -> MembershipResult<Vec<KeyspaceReplication>> {
        Ok(self.view.read().keyspaces.clone())
    }

    async fn node_status(&self, node_id: &NodeId) -> MembershipResult<NodeStatus> {
        self.view
            .read()
            .statuses
            .get(node_id)
            .copied()
            .ok_or_else(|| MembershipError::UnknownNode(node_id.clone()))
    }

    async fn is_alive(&self, node_id: &NodeId) -> MembershipResult<bool> {
        let view = self.view.read();
        if !view.statuses.contains_key(node_id) {
            return Err(MembershipError::UnknownNode(node_id.clone()));
        }
        Ok(!view.down.contains(node_id))
    }

    async fn compare_and_set_status(
        &self,
        node_id: &NodeId,
        expected: NodeStatus,
        new: NodeStatus,
    ) -> MembershipResult<()> {
        let mut view = self.view.write();
        let current = view
            .statuses
            .get_mut(node_id)
            .ok_or_else(|| MembershipError::UnknownNode(node_id.clone()))?;

        if *current != expected {
            return Err(MembershipError::StatusMismatch {
                node_id: node_id.clone(),
                expected,
                actual: *current,
            });
        }

        debug!(
            node_id = %node_id,
            from = %current.state,
            to = %new.state,
            "Membership status updated"
        );
        *current = new;
        Ok(())
    }

    async fn remove_node(&self, node_id: &NodeId) -> MembershipResult<()> {
        let mut view = self.view.write();
        let status = view
            .statuses
            .get(node_id)
            .copied()
            .ok_or_else(|| MembershipError::UnknownNode(node_id.clone()))?;

        if status.state != MembershipState::Left {
            return Err(MembershipError::RemovalRejected {
                node_id: node_id.clone(),
                state: status.state,
            });
        }

        view.ring.remove_node(node_id);
        info!(node_id = %node_id, "Node removed from ring");
        Ok(())
    }
}
