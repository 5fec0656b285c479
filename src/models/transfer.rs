use super::node::{AttemptId, NodeId};
use super::stream_plan::StreamTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one planned transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One ledger entry; the ledger is append-only so a task accumulates several
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub attempt_id: AttemptId,
    pub node_id: NodeId,
    pub task: StreamTask,
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new(
        attempt_id: AttemptId,
        node_id: NodeId,
        task: StreamTask,
        status: TransferStatus,
    ) -> Self {
        Self {
            attempt_id,
            node_id,
            task,
            status,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(
        attempt_id: AttemptId,
        node_id: NodeId,
        task: StreamTask,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(attempt_id, node_id, task, TransferStatus::Failed)
        }
    }
}
