use super::node::NodeId;
use super::token::{Token, TokenRange};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Replication settings of one keyspace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyspaceReplication {
    pub name: String,
    pub replication_factor: usize,
}

impl KeyspaceReplication {
    pub fn new(name: impl Into<String>, replication_factor: usize) -> Self {
        Self {
            name: name.into(),
            replication_factor,
        }
    }
}

/// Token ring: which node owns each token.
///
/// Replica placement follows the simple ring walk: the replicas of a range are
/// the first `replication_factor` distinct nodes found walking clockwise from
/// the range's end token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingTopology {
    tokens: BTreeMap<Token, NodeId>,
}

impl RingTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ring from per-node token assignments
    pub fn from_assignments<I, T>(assignments: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, T)>,
        T: IntoIterator<Item = Token>,
    {
        let mut ring = Self::new();
        for (node, tokens) in assignments {
            ring.assign(node, tokens);
        }
        ring
    }

    /// Assign tokens to a node, replacing any previous owner of those tokens
    pub fn assign(&mut self, node: NodeId, tokens: impl IntoIterator<Item = Token>) {
        for token in tokens {
            self.tokens.insert(token, node.clone());
        }
    }

    /// Drop every token owned by `node`
    pub fn remove_node(&mut self, node: &NodeId) {
        self.tokens.retain(|_, owner| owner != node);
    }

    /// Copy of this ring with `node` removed
    pub fn without_node(&self, node: &NodeId) -> Self {
        let mut ring = self.clone();
        ring.remove_node(node);
        ring
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains_node(&self, node: &NodeId) -> bool {
        self.tokens.values().any(|owner| owner == node)
    }

    pub fn nodes(&self) -> BTreeSet<NodeId> {
        self.tokens.values().cloned().collect()
    }

    pub fn tokens_of(&self, node: &NodeId) -> Vec<Token> {
        self.tokens
            .iter()
            .filter(|(_, owner)| *owner == node)
            .map(|(token, _)| *token)
            .collect()
    }

    /// Every ring range paired with its primary owner, in token order
    pub fn ranges(&self) -> Vec<(TokenRange, NodeId)> {
        let Some((last, _)) = self.tokens.iter().next_back() else {
            return Vec::new();
        };

        let mut previous = *last;
        self.tokens
            .iter()
            .map(|(token, owner)| {
                let range = TokenRange::new(previous, *token);
                previous = *token;
                (range, owner.clone())
            })
            .collect()
    }

    /// Replica set for the range ending at `token`, primary first
    pub fn replicas_for_token(&self, token: Token, replication_factor: usize) -> Vec<NodeId> {
        let mut replicas: Vec<NodeId> = Vec::with_capacity(replication_factor);
        let clockwise = self
            .tokens
            .range(token..)
            .chain(self.tokens.range(..token));

        for (_, owner) in clockwise {
            if replicas.len() == replication_factor {
                break;
            }
            if !replicas.contains(owner) {
                replicas.push(owner.clone());
            }
        }
        replicas
    }

    pub fn replicas_for_range(&self, range: &TokenRange, replication_factor: usize) -> Vec<NodeId> {
        self.replicas_for_token(range.end, replication_factor)
    }

    /// Replica set responsible for a partition key's token
    pub fn replicas_for_key(&self, key: &[u8], replication_factor: usize) -> Vec<NodeId> {
        self.replicas_for_token(Token::for_key(key), replication_factor)
    }

    /// Ranges that `node` holds as primary or replica
    pub fn ranges_replicated_by(&self, node: &NodeId, replication_factor: usize) -> Vec<TokenRange> {
        self.ranges()
            .into_iter()
            .map(|(range, _)| range)
            .filter(|range| {
                self.replicas_for_range(range, replication_factor)
                    .contains(node)
            })
            .collect()
    }
}
