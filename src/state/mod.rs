pub mod export;

use crate::engine::VoteEngine;
use crate::llm::LlmManager;
use crate::protocol::ServerMessage;
use crate::store::{DocumentStore, MemoryStore};
use crate::sync::{StateSynchronizer, Subscription};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Capacity of the per-connection state fan-out channel
const BROADCAST_CAPACITY: usize = 100;

/// Shared application state
pub struct AppState {
    pub engine: VoteEngine,
    pub sync: StateSynchronizer,
    pub llm: Option<Arc<LlmManager>>,
    /// State pushes for every connected WebSocket client
    pub broadcast: broadcast::Sender<ServerMessage>,
    /// Keeps the store listener feeding `broadcast` alive
    subscription: Mutex<Option<Subscription>>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, path: &str, llm: Option<LlmManager>) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            engine: VoteEngine::new(store.clone(), path),
            sync: StateSynchronizer::new(store, path),
            llm: llm.map(Arc::new),
            broadcast: tx,
            subscription: Mutex::new(None),
        }
    }

    /// In-process store without persistence or text generation
    pub fn in_memory(path: &str) -> Self {
        Self::new(Arc::new(MemoryStore::new()), path, None)
    }

    pub fn llm(&self) -> Option<&LlmManager> {
        self.llm.as_deref()
    }

    pub(crate) fn keep_subscription(&self, subscription: Subscription) {
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Replacing drops (and detaches) any previous listener
        *slot = Some(subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameState;

    #[tokio::test]
    async fn test_engine_and_sync_share_document() {
        let state = AppState::in_memory("/gender_reveal/gameState/");

        state.engine.admin_set_max_votes(7).await.unwrap();
        let seen = state.engine.current_state().await.unwrap();

        assert_eq!(seen.max_votes, 7);
        assert_eq!(state.sync.snapshot(), GameState::default());
        assert!(state.llm().is_none());
    }
}
