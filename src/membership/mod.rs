//! # Cluster Membership
//!
//! The membership/ring service is an external collaborator. This module fixes
//! the contract the decommission core relies on and ships an in-memory
//! implementation used by tests and embedded deployments.

pub mod in_memory;

use crate::models::{KeyspaceReplication, MembershipState, NodeId, NodeStatus, RingTopology};
use async_trait::async_trait;
use thiserror::Error;

pub use in_memory::InMemoryMembership;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Status of node {node_id} is {actual:?}, expected {expected:?}")]
    StatusMismatch {
        node_id: NodeId,
        expected: NodeStatus,
        actual: NodeStatus,
    },

    #[error("Node {node_id} cannot be removed from the ring while {state}")]
    RemovalRejected {
        node_id: NodeId,
        state: MembershipState,
    },

    #[error("Membership service unavailable: {0}")]
    Unavailable(String),
}

pub type MembershipResult<T> = Result<T, MembershipError>;

/// Contract of the cluster membership and ring service
#[async_trait]
pub trait ClusterMembership: Send + Sync {
    /// Current token ring
    async fn ring(&self) -> MembershipResult<RingTopology>;

    /// Replication settings for every keyspace
    async fn keyspaces(&self) -> MembershipResult<Vec<KeyspaceReplication>>;

    async fn node_status(&self, node_id: &NodeId) -> MembershipResult<NodeStatus>;

    /// Failure-detector view of the node
    async fn is_alive(&self, node_id: &NodeId) -> MembershipResult<bool>;

    /// Atomically replace `expected` with `new`.
    ///
    /// Fails with [`MembershipError::StatusMismatch`] carrying the actual status
    /// when the stored status differs from `expected`; nothing is written then.
    async fn compare_and_set_status(
        &self,
        node_id: &NodeId,
        expected: NodeStatus,
        new: NodeStatus,
    ) -> MembershipResult<()>;

    /// Drop the node's tokens from the ring. Only accepted once the node is `Left`.
    async fn remove_node(&self, node_id: &NodeId) -> MembershipResult<()>;
}
