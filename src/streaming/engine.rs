use super::errors::{StreamingError, StreamingResult};
use super::store::{RangeDataSource, Row};
use super::throttle::StreamThrottle;
use super::transport::{StreamChunk, StreamTransport};
use crate::config::StreamingConfig;
use crate::events::{EventPublisher, LifecycleEvent};
use crate::logging::log_transfer_operation;
use crate::models::{NodeId, StreamTask, TokenRange};
use dashmap::{DashMap, DashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Outcome of one committed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub task: StreamTask,
    pub rows: u64,
    pub bytes: u64,
    pub chunks: u64,
    pub elapsed: Duration,
}

/// Streams ranges from the local node to their new replicas
pub struct StreamTransferEngine {
    source_node: NodeId,
    source: Arc<dyn RangeDataSource>,
    transport: Arc<dyn StreamTransport>,
    throttle: Arc<StreamThrottle>,
    publisher: EventPublisher,
    chunk_size_bytes: usize,
    inactivity_timeout: Duration,
    max_concurrent_transfers: usize,
    in_flight: DashSet<StreamTask>,
    range_locks: DashMap<(String, TokenRange), Arc<Mutex<()>>>,
}

impl StreamTransferEngine {
    pub fn new(
        source_node: NodeId,
        source: Arc<dyn RangeDataSource>,
        transport: Arc<dyn StreamTransport>,
        throttle: Arc<StreamThrottle>,
        publisher: EventPublisher,
        config: &StreamingConfig,
    ) -> Self {
        Self {
            source_node,
            source,
            transport,
            throttle,
            publisher,
            chunk_size_bytes: config.chunk_size_bytes.max(1),
            inactivity_timeout: config.inactivity_timeout(),
            max_concurrent_transfers: config.max_concurrent_transfers.max(1),
            in_flight: DashSet::new(),
            range_locks: DashMap::new(),
        }
    }

    pub fn source_node(&self) -> &NodeId {
        &self.source_node
    }

    pub fn max_concurrent_transfers(&self) -> usize {
        self.max_concurrent_transfers
    }

    pub fn throttle(&self) -> &StreamThrottle {
        &self.throttle
    }

    /// Move every row of `task.range` to `task.target`.
    ///
    /// The target only exposes the rows once the whole range has been received;
    /// on any error the staging session is aborted. A task already streaming is
    /// rejected; transfers of the same range to other targets wait their turn.
    pub async fn transfer(&self, task: &StreamTask) -> StreamingResult<TransferSummary> {
        let _claim = InFlightClaim::acquire(&self.in_flight, task)?;
        let _range = self.lock_range(task).await;
        let started = Instant::now();

        log_transfer_operation(
            "transfer",
            self.source_node.as_str(),
            &task.keyspace,
            &task.range.to_string(),
            task.target.as_str(),
            "started",
            None,
        );

        let rows = self.source.read_range(&task.keyspace, &task.range).await?;
        let row_count = rows.len() as u64;
        let chunks = chunk_rows(rows, self.chunk_size_bytes);

        let mut session = self
            .with_inactivity_timeout(task, self.transport.open_session(&self.source_node, task))
            .await?;

        let mut bytes = 0u64;
        let chunk_count = chunks.len() as u64;
        for chunk in chunks {
            let chunk_bytes = chunk.byte_len() as u64;
            self.throttle.acquire(chunk_bytes).await;

            let sent = self
                .with_inactivity_timeout(task, session.send(chunk))
                .await;
            if let Err(e) = sent {
                warn!(task = %task, error = %e, "Chunk delivery failed, aborting session");
                session.abort().await;
                return Err(e);
            }
            bytes += chunk_bytes;
        }

        self.with_inactivity_timeout(task, session.commit()).await?;

        let summary = TransferSummary {
            task: task.clone(),
            rows: row_count,
            bytes,
            chunks: chunk_count,
            elapsed: started.elapsed(),
        };

        debug!(
            task = %task,
            rows = summary.rows,
            bytes = summary.bytes,
            chunks = summary.chunks,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Range transfer committed"
        );

        self.publisher.publish(LifecycleEvent::RangeTransferred {
            node_id: self.source_node.clone(),
            keyspace: task.keyspace.clone(),
            range: task.range,
            target: task.target.clone(),
            rows: summary.rows,
            bytes: summary.bytes,
        });

        Ok(summary)
    }

    async fn lock_range(&self, task: &StreamTask) -> OwnedMutexGuard<()> {
        let lock = self
            .range_locks
            .entry((task.keyspace.clone(), task.range))
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    async fn with_inactivity_timeout<T>(
        &self,
        task: &StreamTask,
        operation: impl Future<Output = StreamingResult<T>>,
    ) -> StreamingResult<T> {
        tokio::time::timeout(self.inactivity_timeout, operation)
            .await
            .map_err(|_| StreamingError::Timeout {
                task: task.to_string(),
                after_ms: self.inactivity_timeout.as_millis() as u64,
            })?
    }
}

impl std::fmt::Debug for StreamTransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransferEngine")
            .field("source_node", &self.source_node)
            .field("throttle", &self.throttle)
            .field("chunk_size_bytes", &self.chunk_size_bytes)
            .field("inactivity_timeout", &self.inactivity_timeout)
            .field("max_concurrent_transfers", &self.max_concurrent_transfers)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

/// Marks a task as being streamed for as long as it lives
struct InFlightClaim<'a> {
    registry: &'a DashSet<StreamTask>,
    key: StreamTask,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(
        registry: &'a DashSet<StreamTask>,
        task: &StreamTask,
    ) -> StreamingResult<Self> {
        let key = task.clone();
        if !registry.insert(key.clone()) {
            return Err(StreamingError::RangeInFlight {
                task: task.to_string(),
            });
        }
        Ok(Self { registry, key })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}

/// Split rows into chunks of at most `chunk_size_bytes` (a single oversized row
/// still travels alone)
fn chunk_rows(rows: Vec<Row>, chunk_size_bytes: usize) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<Row> = Vec::new();
    let mut current_bytes = 0usize;

    for row in rows {
        let row_bytes = row.byte_len();
        if !current.is_empty() && current_bytes + row_bytes > chunk_size_bytes {
            chunks.push(StreamChunk::new(chunks.len() as u64, std::mem::take(&mut current)));
            current_bytes = 0;
        }
        current_bytes += row_bytes;
        current.push(row);
    }
    if !current.is_empty() {
        chunks.push(StreamChunk::new(chunks.len() as u64, current));
    }
    chunks
}
