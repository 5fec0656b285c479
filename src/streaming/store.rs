//! Node-local row storage and the read side used by the streaming engine.

use super::errors::StreamingResult;
use crate::models::{Token, TokenRange};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Stored row; `written_at` (microseconds) decides last-write-wins merges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: String,
    pub value: Vec<u8>,
    pub written_at: i64,
}

impl Row {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>, written_at: i64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            written_at,
        }
    }

    pub fn token(&self) -> Token {
        Token::for_key(self.key.as_bytes())
    }

    /// Approximate wire size used for chunking and throttling
    pub fn byte_len(&self) -> usize {
        self.key.len() + self.value.len() + std::mem::size_of::<i64>()
    }
}

/// Read side of the leaving node's data
#[async_trait]
pub trait RangeDataSource: Send + Sync {
    /// Consistent snapshot of every row of `keyspace` whose token falls in `range`
    async fn read_range(&self, keyspace: &str, range: &TokenRange) -> StreamingResult<Vec<Row>>;
}

type KeyspaceRows = BTreeMap<(Token, String), Row>;

/// In-memory storage of one node, keyed by keyspace then `(token, key)`
#[derive(Debug, Default)]
pub struct InMemoryNodeStore {
    keyspaces: RwLock<HashMap<String, KeyspaceRows>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one row, keeping whichever version is newer
    pub fn write(&self, keyspace: &str, row: Row) {
        let mut keyspaces = self.keyspaces.write();
        merge_row(keyspaces.entry(keyspace.to_string()).or_default(), row);
    }

    /// Merge a batch under one lock acquisition so readers never see half of it
    pub fn apply_batch(&self, keyspace: &str, rows: Vec<Row>) {
        let mut keyspaces = self.keyspaces.write();
        let table = keyspaces.entry(keyspace.to_string()).or_default();
        for row in rows {
            merge_row(table, row);
        }
    }

    pub fn read(&self, keyspace: &str, key: &str) -> Option<Row> {
        let token = Token::for_key(key.as_bytes());
        self.keyspaces
            .read()
            .get(keyspace)
            .and_then(|table| table.get(&(token, key.to_string())))
            .cloned()
    }

    pub fn rows_in_range(&self, keyspace: &str, range: &TokenRange) -> Vec<Row> {
        self.keyspaces
            .read()
            .get(keyspace)
            .map(|table| {
                table
                    .iter()
                    .filter(|((token, _), _)| range.contains(*token))
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn row_count(&self, keyspace: &str) -> usize {
        self.keyspaces
            .read()
            .get(keyspace)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

fn merge_row(table: &mut KeyspaceRows, row: Row) {
    let slot = (row.token(), row.key.clone());
    match table.get(&slot) {
        Some(existing) if existing.written_at > row.written_at => {}
        _ => {
            table.insert(slot, row);
        }
    }
}

#[async_trait]
impl RangeDataSource for InMemoryNodeStore {
    async fn read_range(&self, keyspace: &str, range: &TokenRange) -> StreamingResult<Vec<Row>> {
        Ok(self.rows_in_range(keyspace, range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let store = InMemoryNodeStore::new();
        store.write("ks", Row::new("k", b"new".to_vec(), 20));
        store.write("ks", Row::new("k", b"old".to_vec(), 10));
        assert_eq!(store.read("ks", "k").unwrap().value, b"new".to_vec());

        store.apply_batch("ks", vec![Row::new("k", b"newest".to_vec(), 30)]);
        assert_eq!(store.read("ks", "k").unwrap().value, b"newest".to_vec());
        assert_eq!(store.row_count("ks"), 1);
    }

    #[tokio::test]
    async fn test_read_range_filters_by_token() {
        let store = InMemoryNodeStore::new();
        for i in 0..100 {
            store.write("ks", Row::new(format!("key-{i}"), vec![1u8; 4], i));
        }

        let lower = TokenRange::new(Token(i64::MAX), Token(0));
        let upper = TokenRange::new(Token(0), Token(i64::MAX));
        let lower_rows = store.read_range("ks", &lower).await.unwrap();
        let upper_rows = store.read_range("ks", &upper).await.unwrap();

        assert_eq!(lower_rows.len() + upper_rows.len(), 100);
        assert!(lower_rows.iter().all(|row| lower.contains(row.token())));
        assert!(store.read_range("missing", &lower).await.unwrap().is_empty());
    }
}
