use crate::models::NodeId;
use thiserror::Error;

/// Failure of a single range transfer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamingError {
    #[error("Target {target} unavailable: {reason}")]
    TargetUnavailable { target: NodeId, reason: String },

    #[error("Transfer {task} made no progress for {after_ms}ms")]
    Timeout { task: String, after_ms: u64 },

    #[error("Chunk {sequence} for {target} failed checksum verification (expected {expected:#x}, got {actual:#x})")]
    Corruption {
        target: NodeId,
        sequence: u64,
        expected: u32,
        actual: u32,
    },

    #[error("Failed to read local range data: {0}")]
    SourceRead(String),

    #[error("Transport error towards {target}: {reason}")]
    Transport { target: NodeId, reason: String },

    #[error("Range {task} is already being transferred")]
    RangeInFlight { task: String },
}

impl StreamingError {
    pub fn target_unavailable(target: &NodeId, reason: impl Into<String>) -> Self {
        Self::TargetUnavailable {
            target: target.clone(),
            reason: reason.into(),
        }
    }

    pub fn transport(target: &NodeId, reason: impl Into<String>) -> Self {
        Self::Transport {
            target: target.clone(),
            reason: reason.into(),
        }
    }
}

pub type StreamingResult<T> = Result<T, StreamingError>;
