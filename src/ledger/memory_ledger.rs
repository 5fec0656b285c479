use super::{completed_tasks, LedgerResult, TransferLedger};
use crate::models::{NodeId, StreamTask, TransferRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Non-durable ledger for embedded use and tests
#[derive(Debug, Default)]
pub struct InMemoryTransferLedger {
    records: Mutex<Vec<TransferRecord>>,
}

impl InMemoryTransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl TransferLedger for InMemoryTransferLedger {
    async fn record(&self, record: TransferRecord) -> LedgerResult<()> {
        self.records.lock().push(record);
        Ok(())
    }

    async fn completed_ranges(&self, node_id: &NodeId) -> LedgerResult<HashSet<StreamTask>> {
        Ok(completed_tasks(self.records.lock().iter(), node_id))
    }

    async fn records(&self, node_id: &NodeId) -> LedgerResult<Vec<TransferRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|record| &record.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn reset(&self, node_id: &NodeId) -> LedgerResult<()> {
        self.records
            .lock()
            .retain(|record| &record.node_id != node_id);
        Ok(())
    }
}
