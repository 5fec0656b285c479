//! # Transfer Ledger
//!
//! Durable history of per-range transfer outcomes. A range recorded as
//! completed is skipped by every later attempt of the same node until the node
//! has left the ring and the ledger is reset.

pub mod file_ledger;
pub mod memory_ledger;

use crate::models::{NodeId, StreamTask, TransferRecord, TransferStatus};
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

pub use file_ledger::FileTransferLedger;
pub use memory_ledger::InMemoryTransferLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt ledger entry at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Ledger write rejected: {0}")]
    WriteRejected(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[async_trait]
pub trait TransferLedger: Send + Sync {
    /// Append a record; returns only once it is durable
    async fn record(&self, record: TransferRecord) -> LedgerResult<()>;

    /// Every task that ever completed for `node_id`, regardless of attempt
    async fn completed_ranges(&self, node_id: &NodeId) -> LedgerResult<HashSet<StreamTask>>;

    /// Full history for `node_id` in append order
    async fn records(&self, node_id: &NodeId) -> LedgerResult<Vec<TransferRecord>>;

    /// Forget `node_id`; only called once the node has left the ring
    async fn reset(&self, node_id: &NodeId) -> LedgerResult<()>;
}

pub(crate) fn completed_tasks<'a>(
    records: impl IntoIterator<Item = &'a TransferRecord>,
    node_id: &NodeId,
) -> HashSet<StreamTask> {
    records
        .into_iter()
        .filter(|record| &record.node_id == node_id && record.status == TransferStatus::Completed)
        .map(|record| record.task.clone())
        .collect()
}
