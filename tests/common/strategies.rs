use proptest::prelude::*;
use range_decommission::models::{NodeId, RingTopology, Token};
use std::collections::BTreeSet;

/// Strategy for generating node names `node0..node{n}`
pub fn node_names_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<NodeId>> {
    (2..=max_nodes).prop_map(|count| (0..count).map(|i| NodeId::new(format!("node{i}"))).collect())
}

/// Strategy for generating a ring where each node owns 1..=4 distinct tokens
pub fn ring_strategy(max_nodes: usize) -> impl Strategy<Value = RingTopology> {
    node_names_strategy(max_nodes)
        .prop_flat_map(|nodes| {
            let count = nodes.len();
            (
                Just(nodes),
                prop::collection::btree_set(any::<i64>(), count * 4..=count * 4),
                prop::collection::vec(1usize..=4, count..=count),
            )
        })
        .prop_map(|(nodes, tokens, vnodes)| {
            let mut tokens = tokens.into_iter().map(Token);
            let mut ring = RingTopology::new();
            for (node, count) in nodes.into_iter().zip(vnodes) {
                let owned: Vec<Token> = tokens.by_ref().take(count).collect();
                ring.assign(node, owned);
            }
            ring
        })
}

/// Strategy for generating replication factors
pub fn replication_factor_strategy() -> impl Strategy<Value = usize> {
    1usize..=3
}

/// Every node of the ring except `leaving`
pub fn survivors(ring: &RingTopology, leaving: &NodeId) -> BTreeSet<NodeId> {
    ring.nodes().into_iter().filter(|node| node != leaving).collect()
}
