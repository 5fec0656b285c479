//! Target-side staging sessions and the in-memory transport used by tests.

use super::errors::{StreamingError, StreamingResult};
use super::store::{InMemoryNodeStore, Row};
use crate::models::{NodeId, StreamTask};
use async_trait::async_trait;
use crc32fast::Hasher;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Batch of rows sent in one message, protected by a checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub sequence: u64,
    pub rows: Vec<Row>,
    pub checksum: u32,
}

impl StreamChunk {
    pub fn new(sequence: u64, rows: Vec<Row>) -> Self {
        let checksum = checksum_rows(&rows);
        Self {
            sequence,
            rows,
            checksum,
        }
    }

    pub fn computed_checksum(&self) -> u32 {
        checksum_rows(&self.rows)
    }

    pub fn byte_len(&self) -> usize {
        self.rows.iter().map(Row::byte_len).sum()
    }
}

fn checksum_rows(rows: &[Row]) -> u32 {
    let mut hasher = Hasher::new();
    for row in rows {
        hasher.update(row.key.as_bytes());
        hasher.update(&row.value);
        hasher.update(&row.written_at.to_le_bytes());
    }
    hasher.finalize()
}

/// Receiving end of one range transfer.
///
/// Rows sent through a session stay staged on the target until `commit`;
/// `abort`, or dropping the session, discards them.
#[async_trait]
pub trait StreamSession: Send {
    async fn send(&mut self, chunk: StreamChunk) -> StreamingResult<()>;

    /// Make every staged row visible on the target at once
    async fn commit(self: Box<Self>) -> StreamingResult<()>;

    async fn abort(self: Box<Self>);
}

/// Opens staging sessions on target nodes
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open_session(
        &self,
        source: &NodeId,
        task: &StreamTask,
    ) -> StreamingResult<Box<dyn StreamSession>>;
}

/// Deterministic faults for the in-memory transport
#[derive(Debug, Default)]
pub struct FaultInjector {
    unreachable: DashSet<NodeId>,
    fail_after_chunks: DashMap<NodeId, u64>,
    stalled: DashSet<NodeId>,
    corrupting: DashSet<NodeId>,
    chunks_received: DashMap<NodeId, u64>,
    commits: AtomicU64,
    aborts: AtomicU64,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target refuses sessions and chunks until restored
    pub fn make_unreachable(&self, target: &NodeId) {
        self.unreachable.insert(target.clone());
    }

    /// Target goes down once it has accepted `chunks` more chunks
    pub fn fail_after_chunks(&self, target: &NodeId, chunks: u64) {
        let received = self.chunks_received(target);
        self.fail_after_chunks
            .insert(target.clone(), received.saturating_add(chunks));
    }

    /// Chunks sent to the target never get acknowledged
    pub fn stall(&self, target: &NodeId) {
        self.stalled.insert(target.clone());
    }

    /// Target sees payloads that do not match their checksum
    pub fn corrupt(&self, target: &NodeId) {
        self.corrupting.insert(target.clone());
    }

    /// Clear every fault configured for the target
    pub fn restore(&self, target: &NodeId) {
        self.unreachable.remove(target);
        self.fail_after_chunks.remove(target);
        self.stalled.remove(target);
        self.corrupting.remove(target);
    }

    pub fn chunks_received(&self, target: &NodeId) -> u64 {
        self.chunks_received
            .get(target)
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn aborts(&self) -> u64 {
        self.aborts.load(Ordering::Relaxed)
    }

    fn is_unreachable(&self, target: &NodeId) -> bool {
        self.unreachable.contains(target)
    }

    /// Count a delivered chunk; trips the target when its chunk budget runs out
    fn on_chunk(&self, target: &NodeId) -> StreamingResult<()> {
        if self.is_unreachable(target) {
            return Err(StreamingError::target_unavailable(target, "node is down"));
        }

        let received = {
            let mut count = self.chunks_received.entry(target.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let limit = self.fail_after_chunks.get(target).map(|limit| *limit);
        if let Some(limit) = limit {
            if received > limit {
                warn!(target = %target, received, "Injected fault: target going down mid-stream");
                self.unreachable.insert(target.clone());
                return Err(StreamingError::target_unavailable(
                    target,
                    "connection reset by peer",
                ));
            }
        }
        Ok(())
    }
}

/// Routes sessions to per-node [`InMemoryNodeStore`]s
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    stores: DashMap<NodeId, Arc<InMemoryNodeStore>>,
    faults: Arc<FaultInjector>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node_id: NodeId, store: Arc<InMemoryNodeStore>) {
        self.stores.insert(node_id, store);
    }

    pub fn faults(&self) -> Arc<FaultInjector> {
        self.faults.clone()
    }
}

#[async_trait]
impl StreamTransport for InMemoryTransport {
    async fn open_session(
        &self,
        source: &NodeId,
        task: &StreamTask,
    ) -> StreamingResult<Box<dyn StreamSession>> {
        let target = &task.target;
        if self.faults.is_unreachable(target) {
            return Err(StreamingError::target_unavailable(target, "connection refused"));
        }

        let store = self
            .stores
            .get(target)
            .map(|store| store.clone())
            .ok_or_else(|| StreamingError::transport(target, "no such node"))?;

        debug!(source = %source, task = %task, "Opened staging session");

        Ok(Box::new(InMemorySession {
            target: target.clone(),
            keyspace: task.keyspace.clone(),
            store,
            faults: self.faults.clone(),
            staged: Vec::new(),
            next_sequence: 0,
        }))
    }
}

struct InMemorySession {
    target: NodeId,
    keyspace: String,
    store: Arc<InMemoryNodeStore>,
    faults: Arc<FaultInjector>,
    staged: Vec<Row>,
    next_sequence: u64,
}

#[async_trait]
impl StreamSession for InMemorySession {
    async fn send(&mut self, chunk: StreamChunk) -> StreamingResult<()> {
        if self.faults.stalled.contains(&self.target) {
            std::future::pending::<()>().await;
        }
        self.faults.on_chunk(&self.target)?;

        if chunk.sequence != self.next_sequence {
            return Err(StreamingError::transport(
                &self.target,
                format!(
                    "out of order chunk: expected {}, got {}",
                    self.next_sequence, chunk.sequence
                ),
            ));
        }

        let actual = if self.faults.corrupting.contains(&self.target) {
            chunk.computed_checksum() ^ 0x5a5a
        } else {
            chunk.computed_checksum()
        };
        if actual != chunk.checksum {
            return Err(StreamingError::Corruption {
                target: self.target.clone(),
                sequence: chunk.sequence,
                expected: chunk.checksum,
                actual,
            });
        }

        self.next_sequence += 1;
        self.staged.extend(chunk.rows);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StreamingResult<()> {
        if self.faults.is_unreachable(&self.target) {
            return Err(StreamingError::target_unavailable(
                &self.target,
                "node went down before commit",
            ));
        }

        let InMemorySession {
            target,
            keyspace,
            store,
            faults,
            staged,
            ..
        } = *self;
        let rows = staged.len();
        store.apply_batch(&keyspace, staged);
        faults.commits.fetch_add(1, Ordering::Relaxed);
        debug!(target = %target, keyspace = %keyspace, rows, "Committed staged rows");
        Ok(())
    }

    async fn abort(self: Box<Self>) {
        self.faults.aborts.fetch_add(1, Ordering::Relaxed);
        debug!(
            target = %self.target,
            keyspace = %self.keyspace,
            discarded = self.staged.len(),
            "Aborted staging session"
        );
    }
}
