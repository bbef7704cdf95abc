//! Keyed JSON document storage.
//!
//! A store offers four operations on documents addressed by a slash-separated
//! path: one-shot get, unconditional set, a conditional read-modify-write
//! transaction, and change notification. The transaction is the only
//! concurrency primitive the rest of the crate relies on: the caller supplies
//! a pure function from the current value to either a new value or an abort,
//! and the store applies it against a consistent snapshot, retrying on
//! conflicting writes.

mod firebase;
mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;

pub use firebase::{FirebaseConfig, FirebaseStore};
pub use memory::MemoryStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Transaction gave up after {0} conflicting retries")]
    TooManyRetries(u32),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored document is malformed: {0}")]
    Malformed(String),
}

/// What a transaction step wants to do with the document it was shown
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Replace the document with this value
    Commit(Value),
    /// Leave the document untouched
    Abort,
}

/// Borrowed transaction step. May be invoked several times per transaction.
pub type UpdateFn<'a> = &'a (dyn Fn(Option<&Value>) -> Update + Send + Sync);

#[derive(Debug, Clone)]
pub struct TransactionResult {
    pub committed: bool,
    /// Document value after the commit, or the value that caused the abort
    pub snapshot: Option<Value>,
}

/// Emitted once per committed write
#[derive(Debug, Clone)]
pub struct DocumentChange {
    pub path: String,
    pub value: Option<Value>,
}

/// Conflict retries performed before a transaction gives up
pub const DEFAULT_MAX_RETRIES: u32 = 25;

/// Capacity of the change notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the document at `path`
    async fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Overwrite the document at `path` unconditionally
    async fn set(&self, path: &str, value: Value) -> StoreResult<()>;

    /// Apply `update` atomically to the document at `path`
    async fn transaction(&self, path: &str, update: UpdateFn<'_>)
        -> StoreResult<TransactionResult>;

    /// Subscribe to changes of the document at `path`.
    ///
    /// The receiver may also carry changes of other paths; callers filter on
    /// [`DocumentChange::path`].
    fn watch(&self, path: &str) -> broadcast::Receiver<DocumentChange>;

    /// Short name for logging
    fn name(&self) -> &str;
}

/// Canonical form of a document path: no leading or trailing slashes
pub fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn change_channel() -> broadcast::Sender<DocumentChange> {
    let (tx, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
    tx
}

/// Randomized pause between conflicting transaction attempts
async fn conflict_backoff(attempt: u32) {
    let ceiling = 1u64 << attempt.min(6);
    let millis = rand::random_range(0..=ceiling);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/gender_reveal/gameState/"), "gender_reveal/gameState");
        assert_eq!(normalize_path("gender_reveal/gameState"), "gender_reveal/gameState");
        assert_eq!(normalize_path("/"), "");
    }
}
