use async_trait::async_trait;
use range_decommission::config::DecommissionConfig;
use range_decommission::events::{LifecycleEvent, PublishedEvent};
use range_decommission::ledger::{InMemoryTransferLedger, LedgerError, LedgerResult, TransferLedger};
use range_decommission::membership::InMemoryMembership;
use range_decommission::models::{NodeId, StreamTask, Token, TransferRecord, TransferStatus};
use range_decommission::orchestration::DecommissionService;
use range_decommission::streaming::{FaultInjector, InMemoryNodeStore, InMemoryTransport, Row};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Configuration tuned for tests: unthrottled, small chunks, short timeouts
pub fn test_config() -> DecommissionConfig {
    let mut config = DecommissionConfig::default();
    config.streaming.stream_throughput_outbound_megabits_per_sec = 0;
    config.streaming.chunk_size_bytes = 4096;
    config.streaming.inactivity_timeout_ms = 2_000;
    config
}

/// Same as [`test_config`] but limited to `megabits` per second
pub fn throttled_config(megabits: u32) -> DecommissionConfig {
    let mut config = test_config();
    config.streaming.stream_throughput_outbound_megabits_per_sec = megabits;
    config
}

/// `count` tokens spread evenly over the whole ring
pub fn evenly_spaced_tokens(count: usize) -> Vec<Token> {
    let step = (1i128 << 64) / count.max(1) as i128;
    (0..count)
        .map(|i| Token((i64::MIN as i128 + step * i as i128) as i64))
        .collect()
}

/// A whole cluster in one process: shared membership, one store per node and a
/// transport routing sessions between them
pub struct SimulatedCluster {
    pub membership: Arc<InMemoryMembership>,
    pub transport: Arc<InMemoryTransport>,
    stores: BTreeMap<NodeId, Arc<InMemoryNodeStore>>,
    clock: AtomicI64,
}

impl SimulatedCluster {
    /// Build a cluster where every node owns `vnodes` interleaved tokens
    pub fn new(names: &[&str], vnodes: usize) -> Self {
        let membership = Arc::new(InMemoryMembership::new());
        let transport = Arc::new(InMemoryTransport::new());
        let tokens = evenly_spaced_tokens(names.len() * vnodes);
        let mut stores = BTreeMap::new();

        for (index, name) in names.iter().enumerate() {
            let node = NodeId::from(*name);
            let owned: Vec<Token> = tokens
                .iter()
                .skip(index)
                .step_by(names.len())
                .copied()
                .collect();
            membership.add_node(node.clone(), owned);

            let store = Arc::new(InMemoryNodeStore::new());
            transport.register(node.clone(), store.clone());
            stores.insert(node, store);
        }

        Self {
            membership,
            transport,
            stores,
            clock: AtomicI64::new(1),
        }
    }

    pub fn with_keyspace(self, name: &str, replication_factor: usize) -> Self {
        self.membership.add_keyspace(name, replication_factor);
        self
    }

    pub fn store(&self, node: &str) -> Arc<InMemoryNodeStore> {
        self.stores[&NodeId::from(node)].clone()
    }

    pub fn faults(&self) -> Arc<FaultInjector> {
        self.transport.faults()
    }

    fn replication_factor(&self, keyspace: &str) -> usize {
        self.membership
            .replication_factor(keyspace)
            .expect("keyspace is registered")
    }

    /// Write a row to every replica the current ring assigns the key to
    pub fn write(&self, keyspace: &str, key: &str, value: &[u8]) {
        let written_at = self.clock.fetch_add(1, Ordering::SeqCst);
        let ring = self.membership.ring_snapshot();
        for replica in ring.replicas_for_key(key.as_bytes(), self.replication_factor(keyspace)) {
            self.stores[&replica].write(keyspace, Row::new(key, value.to_vec(), written_at));
        }
    }

    /// Write `count` keys with `value_len`-byte values and return the keys
    pub fn load_keys(&self, keyspace: &str, count: usize, value_len: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let key = format!("key-{i:05}");
                self.write(keyspace, &key, &value_for(&key, value_len));
                key
            })
            .collect()
    }

    /// Whether every replica the current ring assigns the key to holds it
    pub fn is_fully_replicated(&self, keyspace: &str, key: &str, value_len: usize) -> bool {
        let expected = value_for(key, value_len);
        let ring = self.membership.ring_snapshot();
        let replicas = ring.replicas_for_key(key.as_bytes(), self.replication_factor(keyspace));

        replicas.len() == self.replication_factor(keyspace)
            && replicas.iter().all(|replica| {
                self.stores[replica]
                    .read(keyspace, key)
                    .is_some_and(|row| row.value == expected)
            })
    }

    /// Decommission service running on `node`
    pub fn service(
        &self,
        node: &str,
        config: &DecommissionConfig,
        ledger: Arc<dyn TransferLedger>,
    ) -> DecommissionService {
        DecommissionService::new(
            config,
            NodeId::from(node),
            self.membership.clone(),
            self.store(node),
            self.transport.clone(),
            ledger,
        )
    }
}

/// Deterministic payload so readers can check what they got back
pub fn value_for(key: &str, len: usize) -> Vec<u8> {
    key.bytes().cycle().take(len).collect()
}

/// Wait for the first event matching `predicate`, failing the test after a minute
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<PublishedEvent>,
    predicate: impl Fn(&LifecycleEvent) -> bool,
) -> LifecycleEvent {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match events.recv().await {
                Ok(published) if predicate(&published.event) => return published.event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for lifecycle event")
}

/// Every event already sitting in the channel
pub fn drain_events(events: &mut broadcast::Receiver<PublishedEvent>) -> Vec<LifecycleEvent> {
    let mut drained = Vec::new();
    while let Ok(published) = events.try_recv() {
        drained.push(published.event);
    }
    drained
}

/// Ledger that rejects writes of one status, or resets, until healed
pub struct FailingLedger {
    inner: InMemoryTransferLedger,
    fail_on: Option<TransferStatus>,
    fail_reset: bool,
    armed: AtomicBool,
}

impl FailingLedger {
    pub fn failing_on(fail_on: TransferStatus) -> Self {
        Self {
            inner: InMemoryTransferLedger::new(),
            fail_on: Some(fail_on),
            fail_reset: false,
            armed: AtomicBool::new(true),
        }
    }

    pub fn failing_reset() -> Self {
        Self {
            inner: InMemoryTransferLedger::new(),
            fail_on: None,
            fail_reset: true,
            armed: AtomicBool::new(true),
        }
    }

    pub fn heal(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    fn armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferLedger for FailingLedger {
    async fn record(&self, record: TransferRecord) -> LedgerResult<()> {
        if self.armed() && self.fail_on == Some(record.status) {
            return Err(LedgerError::WriteRejected("disk full".to_string()));
        }
        self.inner.record(record).await
    }

    async fn completed_ranges(&self, node_id: &NodeId) -> LedgerResult<HashSet<StreamTask>> {
        self.inner.completed_ranges(node_id).await
    }

    async fn records(&self, node_id: &NodeId) -> LedgerResult<Vec<TransferRecord>> {
        self.inner.records(node_id).await
    }

    async fn reset(&self, node_id: &NodeId) -> LedgerResult<()> {
        if self.armed() && self.fail_reset {
            return Err(LedgerError::WriteRejected("disk full".to_string()));
        }
        self.inner.reset(node_id).await
    }
}
