use crate::config::ConfigurationError;
use crate::ledger::LedgerError;
use crate::membership::MembershipError;
use crate::models::{AttemptId, NodeId};
use crate::state_machine::StateMachineError;
use crate::streaming::StreamingError;
use thiserror::Error;

/// Top-level error surfaced by the decommission operation
#[derive(Debug, Error)]
pub enum DecommissionError {
    /// Another attempt already holds the node's leaving lock; nothing was mutated
    #[error("Decommission already in progress for node {node_id} (attempt {active_attempt:?})")]
    ConcurrentOperation {
        node_id: NodeId,
        active_attempt: Option<AttemptId>,
    },

    /// Too few eligible nodes would remain to keep a keyspace's replication factor
    #[error("Insufficient replicas for keyspace {keyspace}: need {required}, only {available} eligible nodes would remain")]
    InsufficientReplicas {
        keyspace: String,
        required: usize,
        available: usize,
    },

    /// Ranges are streamed from local storage, so only the local node can be decommissioned here
    #[error("Node {requested} is not the local node {local}")]
    NotLocalNode { requested: NodeId, local: NodeId },

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Ledger persistence error: {0}")]
    LedgerPersistence(#[from] LedgerError),

    #[error("Membership error: {0}")]
    Membership(#[from] MembershipError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl DecommissionError {
    /// Whether re-invoking the decommission later can succeed without operator changes
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentOperation { .. } | Self::Streaming(_) | Self::LedgerPersistence(_)
        )
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ConcurrentOperation { .. } => "concurrent_operation",
            Self::InsufficientReplicas { .. } => "insufficient_replicas",
            Self::NotLocalNode { .. } => "not_local_node",
            Self::Streaming(_) => "streaming",
            Self::LedgerPersistence(_) => "ledger_persistence",
            Self::Membership(_) => "membership",
            Self::StateMachine(_) => "state_machine",
            Self::Configuration(_) => "configuration",
        }
    }
}

pub type Result<T> = std::result::Result<T, DecommissionError>;
