//! Vote transaction engine.
//!
//! Every mutation of the game document runs as a store transaction: the
//! engine hands the store a pure step from the current [`GameState`] to the
//! next one (or to an abort) and the store applies it atomically, retrying
//! on conflicting writes. Preconditions are checked inside the step, never
//! beforehand, so concurrent writers cannot slip between check and write.

mod admin;
mod vote;

use crate::store::{normalize_path, DocumentStore, StoreError, StoreResult, Update};
use crate::types::GameState;
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub use vote::{CastOutcome, CastVote, CONNECTION_ERROR_MESSAGE, VOTE_REJECTED_MESSAGE};

pub struct VoteEngine {
    store: Arc<dyn DocumentStore>,
    path: String,
}

impl VoteEngine {
    pub fn new(store: Arc<dyn DocumentStore>, path: &str) -> Self {
        Self {
            store,
            path: normalize_path(path),
        }
    }

    /// One-shot read of the authoritative state
    pub async fn current_state(&self) -> StoreResult<GameState> {
        let doc = self.store.get(&self.path).await?;
        Ok(GameState::from_document(doc.as_ref()))
    }

    /// Atomically apply `step` to the game state.
    ///
    /// An absent document is presented to `step` as the default state.
    /// A document that does not parse is left untouched and reported as
    /// [`StoreError::Malformed`]. Returns the committed state, or `None`
    /// when `step` aborted.
    async fn update_state<F>(&self, step: F) -> StoreResult<Option<GameState>>
    where
        F: Fn(GameState) -> Option<GameState> + Send + Sync,
    {
        let malformed: Mutex<Option<String>> = Mutex::new(None);

        let update = |current: Option<&Value>| {
            let state = match GameState::parse_document(current) {
                Ok(state) => state,
                Err(e) => {
                    if let Ok(mut slot) = malformed.lock() {
                        *slot = Some(e.to_string());
                    }
                    return Update::Abort;
                }
            };
            if let Ok(mut slot) = malformed.lock() {
                *slot = None;
            }
            let Some(next) = step(state) else {
                return Update::Abort;
            };
            match next.to_document() {
                Ok(doc) => Update::Commit(doc),
                Err(e) => {
                    tracing::error!("Failed to serialize game state: {}", e);
                    Update::Abort
                }
            }
        };

        let result = self.store.transaction(&self.path, &update).await?;
        if !result.committed {
            if let Some(reason) = malformed.lock().ok().and_then(|mut slot| slot.take()) {
                tracing::error!("Refusing to overwrite malformed game state: {}", reason);
                return Err(StoreError::Malformed(reason));
            }
        }
        Ok(result
            .committed
            .then(|| GameState::from_document(result.snapshot.as_ref())))
    }
}
