//! # Decommission Service
//!
//! Administrative entry point. Wires configuration and collaborators into a
//! [`DecommissionContext`] and runs one state machine per admitted attempt.

use crate::config::DecommissionConfig;
use crate::error::{DecommissionError, Result};
use crate::events::{EventPublisher, PublishedEvent};
use crate::ledger::TransferLedger;
use crate::membership::ClusterMembership;
use crate::models::{NodeId, NodeStatus};
use crate::orchestration::range_planner::RangeOwnershipPlanner;
use crate::state_machine::{
    ConcurrencyGuard, DecommissionContext, DecommissionReport, DecommissionState,
    DecommissionStateMachine, InMemoryTransitionPersistence,
};
use crate::streaming::{RangeDataSource, StreamThrottle, StreamTransferEngine, StreamTransport};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Point-in-time view of a node's decommission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecommissionStatus {
    pub node_id: NodeId,
    pub state: DecommissionState,
    pub membership: NodeStatus,
    /// Transfers durably recorded as completed and not yet reset
    pub completed_transfers: usize,
}

/// Decommissions the local node of a storage process
pub struct DecommissionService {
    local_node: NodeId,
    context: Arc<DecommissionContext>,
}

impl DecommissionService {
    /// Build the service from configuration and the process's collaborators
    pub fn new(
        config: &DecommissionConfig,
        local_node: NodeId,
        membership: Arc<dyn ClusterMembership>,
        source: Arc<dyn RangeDataSource>,
        transport: Arc<dyn StreamTransport>,
        ledger: Arc<dyn TransferLedger>,
    ) -> Self {
        let publisher = EventPublisher::new(config.events.channel_capacity);
        let throttle = Arc::new(StreamThrottle::new(
            config.streaming.throughput_bytes_per_sec(),
        ));
        let engine = Arc::new(StreamTransferEngine::new(
            local_node.clone(),
            source,
            transport,
            throttle,
            publisher.clone(),
            &config.streaming,
        ));

        info!(
            node_id = %local_node,
            throughput_mbps = config.streaming.stream_throughput_outbound_megabits_per_sec,
            max_concurrent_transfers = engine.max_concurrent_transfers(),
            "Decommission service ready"
        );

        let context = DecommissionContext {
            guard: Arc::new(ConcurrencyGuard::new(membership.clone())),
            planner: RangeOwnershipPlanner::new(membership.clone()),
            membership,
            engine,
            ledger,
            persistence: Arc::new(InMemoryTransitionPersistence::new()),
            publisher,
        };

        Self::from_context(local_node, context)
    }

    /// Build the service around an already assembled context
    pub fn from_context(local_node: NodeId, context: DecommissionContext) -> Self {
        Self {
            local_node,
            context: Arc::new(context),
        }
    }

    pub fn local_node(&self) -> &NodeId {
        &self.local_node
    }

    pub fn context(&self) -> &DecommissionContext {
        &self.context
    }

    /// Subscribe to lifecycle events of every attempt run by this service
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.context.publisher.subscribe()
    }

    /// Move every range of `node_id` to its new replicas and remove the node
    /// from the ring.
    ///
    /// Awaits a terminal outcome. A second call while an attempt is running
    /// fails with [`DecommissionError::ConcurrentOperation`]. After a failure
    /// calling again resumes, skipping ranges already transferred.
    pub async fn decommission(&self, node_id: &NodeId) -> Result<DecommissionReport> {
        self.ensure_local(node_id)?;

        let handle = self.context.guard.begin(node_id).await?;
        let mut machine = DecommissionStateMachine::new(node_id.clone(), self.context.clone());
        machine.run(handle).await
    }

    /// Current lifecycle state, membership status and completed transfer count
    pub async fn status(&self, node_id: &NodeId) -> Result<DecommissionStatus> {
        let state = self
            .context
            .persistence
            .resolve_current_state(node_id)
            .await?
            .unwrap_or_default();
        let membership = self.context.membership.node_status(node_id).await?;
        let completed_transfers = self.context.ledger.completed_ranges(node_id).await?.len();

        Ok(DecommissionStatus {
            node_id: node_id.clone(),
            state,
            membership,
            completed_transfers,
        })
    }

    /// Clear a leaving marker the local node kept from an attempt that died
    /// with a previous process. Call once at startup.
    pub async fn recover(&self) -> Result<bool> {
        let recovered = self.context.guard.recover_stale(&self.local_node).await?;
        if recovered {
            warn!(
                node_id = %self.local_node,
                "Recovered from an interrupted decommission; ledger progress is kept"
            );
        }
        Ok(recovered)
    }

    fn ensure_local(&self, node_id: &NodeId) -> Result<()> {
        if node_id != &self.local_node {
            return Err(DecommissionError::NotLocalNode {
                requested: node_id.clone(),
                local: self.local_node.clone(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for DecommissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecommissionService")
            .field("local_node", &self.local_node)
            .field("engine", &self.context.engine)
            .finish()
    }
}
