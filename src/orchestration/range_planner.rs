//! # Range Ownership Planner
//!
//! Works out which ranges the leaving node is responsible for and which
//! surviving nodes have to receive a copy so every keyspace keeps its
//! replication factor once the node's tokens are gone.

use crate::error::{DecommissionError, Result};
use crate::membership::ClusterMembership;
use crate::models::{KeyspaceReplication, NodeId, RingTopology, StreamPlan, StreamTask};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Builds a fresh [`StreamPlan`] for every attempt from current membership
pub struct RangeOwnershipPlanner {
    membership: Arc<dyn ClusterMembership>,
}

impl RangeOwnershipPlanner {
    pub fn new(membership: Arc<dyn ClusterMembership>) -> Self {
        Self { membership }
    }

    /// Plan the transfers required to remove `node_id` from the ring
    pub async fn plan(&self, node_id: &NodeId) -> Result<StreamPlan> {
        let ring = self.membership.ring().await?;
        let keyspaces = self.membership.keyspaces().await?;

        let mut eligible = BTreeSet::new();
        let mut ineligible = BTreeSet::new();
        for candidate in ring.nodes() {
            if &candidate == node_id {
                continue;
            }
            let status = self.membership.node_status(&candidate).await?;
            if !status.state.is_eligible_replica() {
                ineligible.insert(candidate);
                continue;
            }
            if self.membership.is_alive(&candidate).await? {
                eligible.insert(candidate);
            }
        }

        debug!(
            node_id = %node_id,
            eligible = eligible.len(),
            ineligible = ineligible.len(),
            keyspaces = keyspaces.len(),
            "Computing stream plan"
        );

        let plan = compute_stream_plan(node_id, &ring, &keyspaces, &eligible, &ineligible)?;

        info!(
            node_id = %node_id,
            tasks = plan.len(),
            targets = plan.targets().len(),
            "Stream plan computed"
        );
        Ok(plan)
    }
}

/// Deterministic planning core.
///
/// `eligible` holds the surviving nodes that are joined and live. Nodes in
/// `ineligible` (leaving or left) are dropped from the future ring alongside
/// the leaving node so no range is handed to a node that is itself going away.
pub fn compute_stream_plan(
    node_id: &NodeId,
    ring: &RingTopology,
    keyspaces: &[KeyspaceReplication],
    eligible: &BTreeSet<NodeId>,
    ineligible: &BTreeSet<NodeId>,
) -> Result<StreamPlan> {
    let mut future_ring = ring.without_node(node_id);
    for departing in ineligible {
        future_ring.remove_node(departing);
    }

    let mut seen = HashSet::new();
    let mut tasks = Vec::new();

    for keyspace in keyspaces {
        let replication_factor = keyspace.replication_factor;
        if replication_factor == 0 {
            continue;
        }

        let owned = ring.ranges_replicated_by(node_id, replication_factor);
        if owned.is_empty() {
            continue;
        }

        if eligible.len() < replication_factor {
            return Err(DecommissionError::InsufficientReplicas {
                keyspace: keyspace.name.clone(),
                required: replication_factor,
                available: eligible.len(),
            });
        }

        for range in owned {
            let current = ring.replicas_for_range(&range, replication_factor);
            let future = future_ring.replicas_for_range(&range, replication_factor);

            for target in future.into_iter().filter(|node| !current.contains(node)) {
                let task = StreamTask::new(keyspace.name.clone(), range, target);
                if seen.insert(task.clone()) {
                    tasks.push(task);
                }
            }
        }
    }

    Ok(StreamPlan::new(node_id.clone(), tasks))
}
