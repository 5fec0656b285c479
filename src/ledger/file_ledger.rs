use super::{completed_tasks, LedgerError, LedgerResult, TransferLedger};
use crate::models::{NodeId, StreamTask, TransferRecord};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Append-only JSON-lines ledger.
///
/// Every record is flushed and `fsync`ed before `record` returns. On open the
/// file is replayed; a torn final line left by a crash mid-append is cut off.
/// A failed append is cut off the same way before the next one, so a later
/// record never lands behind half a line.
#[derive(Debug)]
pub struct FileTransferLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

#[derive(Debug)]
struct LedgerState {
    file: File,
    records: Vec<TransferRecord>,
    /// Length of the file up to the last fully persisted record
    durable_len: u64,
}

impl LedgerState {
    async fn append(&mut self, line: &[u8]) -> LedgerResult<()> {
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }

    /// Drop bytes past `durable_len` left behind by an interrupted append
    async fn discard_torn_tail(&mut self, path: &Path) -> LedgerResult<()> {
        let actual_len = self.file.metadata().await?.len();
        if actual_len > self.durable_len {
            warn!(
                path = %path.display(),
                discarded_bytes = actual_len - self.durable_len,
                "Truncating torn ledger entry"
            );
            self.file.set_len(self.durable_len).await?;
            self.file.sync_data().await?;
        }
        Ok(())
    }
}

impl FileTransferLedger {
    /// Open (or create) the ledger at `path` and replay its history
    pub async fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let (records, durable_len) = match fs::read(&path).await {
            Ok(bytes) => replay(&path, &bytes).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), 0),
            Err(e) => return Err(e.into()),
        };

        let file = open_for_append(&path).await?;

        info!(
            path = %path.display(),
            records = records.len(),
            "Transfer ledger opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(LedgerState {
                file,
                records,
                durable_len,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn open_for_append(path: &Path) -> LedgerResult<File> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?)
}

async fn replay(path: &Path, bytes: &[u8]) -> LedgerResult<(Vec<TransferRecord>, u64)> {
    let complete_len = match bytes.iter().rposition(|byte| *byte == b'\n') {
        Some(index) => index + 1,
        None => 0,
    };

    if complete_len < bytes.len() {
        warn!(
            path = %path.display(),
            discarded_bytes = bytes.len() - complete_len,
            "Truncating torn ledger entry"
        );
        let file = OpenOptions::new().write(true).open(path).await?;
        file.set_len(complete_len as u64).await?;
        file.sync_all().await?;
    }

    let text = std::str::from_utf8(&bytes[..complete_len]).map_err(|e| LedgerError::Corrupt {
        line: 0,
        reason: e.to_string(),
    })?;

    let records = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                line: index + 1,
                reason: e.to_string(),
            })
        })
        .collect::<LedgerResult<Vec<_>>>()?;

    Ok((records, complete_len as u64))
}

fn encode(record: &TransferRecord) -> LedgerResult<Vec<u8>> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}

#[async_trait]
impl TransferLedger for FileTransferLedger {
    async fn record(&self, record: TransferRecord) -> LedgerResult<()> {
        let line = encode(&record)?;
        let mut state = self.state.lock().await;

        state.discard_torn_tail(&self.path).await?;
        if let Err(e) = state.append(&line).await {
            if let Err(repair) = state.discard_torn_tail(&self.path).await {
                warn!(
                    path = %self.path.display(),
                    error = %repair,
                    "Could not truncate failed ledger append"
                );
            }
            return Err(e);
        }
        state.durable_len += line.len() as u64;

        debug!(
            node_id = %record.node_id,
            task = %record.task,
            status = %record.status,
            "Ledger record persisted"
        );
        state.records.push(record);
        Ok(())
    }

    async fn completed_ranges(&self, node_id: &NodeId) -> LedgerResult<HashSet<StreamTask>> {
        let state = self.state.lock().await;
        Ok(completed_tasks(state.records.iter(), node_id))
    }

    async fn records(&self, node_id: &NodeId) -> LedgerResult<Vec<TransferRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|record| &record.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn reset(&self, node_id: &NodeId) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        let retained: Vec<TransferRecord> = state
            .records
            .iter()
            .filter(|record| &record.node_id != node_id)
            .cloned()
            .collect();

        let mut contents = Vec::new();
        for record in &retained {
            contents.extend(encode(record)?);
        }

        let temp_path = self.path.with_extension("jsonl.tmp");
        let mut temp = File::create(&temp_path).await?;
        temp.write_all(&contents).await?;
        temp.flush().await?;
        temp.sync_all().await?;
        drop(temp);

        fs::rename(&temp_path, &self.path).await?;
        state.file = open_for_append(&self.path).await?;
        state.durable_len = contents.len() as u64;

        info!(
            node_id = %node_id,
            removed = state.records.len() - retained.len(),
            "Transfer ledger reset"
        );
        state.records = retained;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptId, Token, TokenRange, TransferStatus};
    use std::io::Write;

    fn task(end: i64) -> StreamTask {
        StreamTask::new(
            "ks",
            TokenRange::new(Token(end - 10), Token(end)),
            NodeId::from("node1"),
        )
    }

    #[tokio::test]
    async fn test_completed_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let node2 = NodeId::from("node2");
        let attempt = AttemptId::new();

        {
            let ledger = FileTransferLedger::open(&path).await.unwrap();
            for (end, status) in [
                (10, TransferStatus::Completed),
                (20, TransferStatus::InProgress),
                (30, TransferStatus::Failed),
            ] {
                ledger
                    .record(TransferRecord::new(attempt, node2.clone(), task(end), status))
                    .await
                    .unwrap();
            }
        }

        let reopened = FileTransferLedger::open(&path).await.unwrap();
        let completed = reopened.completed_ranges(&node2).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert!(completed.contains(&task(10)));
        assert_eq!(reopened.records(&node2).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_completion_is_attempt_independent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileTransferLedger::open(dir.path().join("ledger.jsonl"))
            .await
            .unwrap();
        let node2 = NodeId::from("node2");

        ledger
            .record(TransferRecord::new(
                AttemptId::new(),
                node2.clone(),
                task(10),
                TransferStatus::Completed,
            ))
            .await
            .unwrap();
        ledger
            .record(TransferRecord::new(
                AttemptId::new(),
                node2.clone(),
                task(20),
                TransferStatus::Completed,
            ))
            .await
            .unwrap();

        assert_eq!(ledger.completed_ranges(&node2).await.unwrap().len(), 2);
        assert!(ledger
            .completed_ranges(&NodeId::from("node3"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let node2 = NodeId::from("node2");

        {
            let ledger = FileTransferLedger::open(&path).await.unwrap();
            ledger
                .record(TransferRecord::new(
                    AttemptId::new(),
                    node2.clone(),
                    task(10),
                    TransferStatus::Completed,
                ))
                .await
                .unwrap();
        }
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"attempt_id\":\"trunc").unwrap();
        }

        let ledger = FileTransferLedger::open(&path).await.unwrap();
        assert_eq!(ledger.completed_ranges(&node2).await.unwrap().len(), 1);

        ledger
            .record(TransferRecord::new(
                AttemptId::new(),
                node2.clone(),
                task(20),
                TransferStatus::Completed,
            ))
            .await
            .unwrap();
        drop(ledger);

        let reopened = FileTransferLedger::open(&path).await.unwrap();
        assert_eq!(reopened.completed_ranges(&node2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_torn_append_is_cut_before_the_next_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let node2 = NodeId::from("node2");
        let ledger = FileTransferLedger::open(&path).await.unwrap();

        ledger
            .record(TransferRecord::new(
                AttemptId::new(),
                node2.clone(),
                task(10),
                TransferStatus::Completed,
            ))
            .await
            .unwrap();

        // An append that died halfway, with the ledger still open
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"attempt_id\":\"par").unwrap();
        }

        ledger
            .record(TransferRecord::new(
                AttemptId::new(),
                node2.clone(),
                task(20),
                TransferStatus::Completed,
            ))
            .await
            .unwrap();
        drop(ledger);

        let reopened = FileTransferLedger::open(&path).await.unwrap();
        let completed = reopened.completed_ranges(&node2).await.unwrap();
        assert_eq!(completed.len(), 2);
        assert!(completed.contains(&task(10)));
        assert!(completed.contains(&task(20)));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("\"par"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_middle_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        std::fs::write(&path, b"not json\n").unwrap();

        let err = FileTransferLedger::open(&path).await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_reset_only_drops_the_given_node() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let ledger = FileTransferLedger::open(&path).await.unwrap();
        let node2 = NodeId::from("node2");
        let node3 = NodeId::from("node3");

        for node in [&node2, &node3] {
            ledger
                .record(TransferRecord::new(
                    AttemptId::new(),
                    node.clone(),
                    task(10),
                    TransferStatus::Completed,
                ))
                .await
                .unwrap();
        }

        ledger.reset(&node2).await.unwrap();
        assert!(ledger.completed_ranges(&node2).await.unwrap().is_empty());
        assert_eq!(ledger.completed_ranges(&node3).await.unwrap().len(), 1);
        drop(ledger);

        let reopened = FileTransferLedger::open(&path).await.unwrap();
        assert!(reopened.records(&node2).await.unwrap().is_empty());
        assert_eq!(reopened.records(&node3).await.unwrap().len(), 1);
    }
}
