//! In-process document store.
//!
//! Each path holds a value and a version counter. A transaction reads the
//! pair, runs the update without holding any lock, and commits only if the
//! version is still the one it read. Optionally mirrors every document into
//! a JSON snapshot file so state survives restarts.

use super::*;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Record {
    value: Option<Value>,
    version: u64,
}

pub struct MemoryStore {
    records: RwLock<HashMap<String, Record>>,
    changes: broadcast::Sender<DocumentChange>,
    max_retries: u32,
    snapshot_file: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty store without persistence
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            changes: change_channel(),
            max_retries: DEFAULT_MAX_RETRIES,
            snapshot_file: None,
        }
    }

    /// Open a store backed by a snapshot file, loading it if it exists
    pub async fn open(snapshot_file: impl Into<PathBuf>) -> StoreResult<Self> {
        let snapshot_file = snapshot_file.into();

        let records = match tokio::fs::read(&snapshot_file).await {
            Ok(bytes) => {
                let docs: HashMap<String, Value> = serde_json::from_slice(&bytes)?;
                tracing::info!(
                    "Loaded {} document(s) from {}",
                    docs.len(),
                    snapshot_file.display()
                );
                docs.into_iter()
                    .map(|(path, value)| {
                        (
                            path,
                            Record {
                                value: Some(value),
                                version: 1,
                            },
                        )
                    })
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No snapshot at {}, starting empty",
                    snapshot_file.display()
                );
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            records: RwLock::new(records),
            snapshot_file: Some(snapshot_file),
            ..Self::new()
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn read(&self, path: &str) -> (Option<Value>, u64) {
        let records = self.records.read().await;
        match records.get(path) {
            Some(record) => (record.value.clone(), record.version),
            None => (None, 0),
        }
    }

    /// Write `value` if the record is still at `expected` (or unconditionally
    /// when `expected` is `None`). Returns whether the write happened.
    async fn write(&self, path: &str, expected: Option<u64>, value: Value) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        let version = records.get(path).map_or(0, |r| r.version);

        if expected.is_some_and(|v| v != version) {
            return Ok(false);
        }

        // Persist before applying so a failed write leaves the old state in place
        self.persist(&records, path, &value).await?;

        let record = records.entry(path.to_string()).or_default();
        record.value = Some(value.clone());
        record.version = version + 1;

        // Sent under the lock so watchers see commits in version order
        let _ = self.changes.send(DocumentChange {
            path: path.to_string(),
            value: Some(value),
        });

        Ok(true)
    }

    async fn persist(
        &self,
        records: &HashMap<String, Record>,
        path: &str,
        value: &Value,
    ) -> StoreResult<()> {
        let Some(file) = &self.snapshot_file else {
            return Ok(());
        };

        let mut docs: BTreeMap<&str, &Value> = records
            .iter()
            .filter_map(|(p, r)| r.value.as_ref().map(|v| (p.as_str(), v)))
            .collect();
        docs.insert(path, value);

        let bytes = serde_json::to_vec_pretty(&docs)?;
        tokio::fs::write(file, bytes).await?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let path = normalize_path(path);
        Ok(self.read(&path).await.0)
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let path = normalize_path(path);
        self.write(&path, None, value).await?;
        Ok(())
    }

    async fn transaction(
        &self,
        path: &str,
        update: UpdateFn<'_>,
    ) -> StoreResult<TransactionResult> {
        let path = normalize_path(path);

        // One first attempt plus `max_retries` retries
        for attempt in 0..=self.max_retries {
            let (current, version) = self.read(&path).await;

            match update(current.as_ref()) {
                Update::Abort => {
                    return Ok(TransactionResult {
                        committed: false,
                        snapshot: current,
                    });
                }
                Update::Commit(next) => {
                    if self.write(&path, Some(version), next.clone()).await? {
                        return Ok(TransactionResult {
                            committed: true,
                            snapshot: Some(next),
                        });
                    }
                    tracing::debug!(
                        "Transaction on {} conflicted (attempt {}), retrying",
                        path,
                        attempt + 1
                    );
                    conflict_backoff(attempt).await;
                }
            }
        }

        tracing::warn!(
            "Transaction on {} abandoned after {} retries",
            path,
            self.max_retries
        );
        Err(StoreError::TooManyRetries(self.max_retries))
    }

    fn watch(&self, _path: &str) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }

    fn name(&self) -> &str {
        "memory"
    }
}
