//! Push-based game state synchronization.
//!
//! Every `subscribe` call attaches its own listener to the game document and
//! receives every change, from this process or any other writer. The first
//! subscriber to find the document missing seeds it with the default state.
//! The last state seen by any subscription is kept in a single cache so
//! synchronous readers can get a recent snapshot without touching the store.

use crate::store::{normalize_path, DocumentStore, StoreResult};
use crate::types::GameState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub struct StateSynchronizer {
    store: Arc<dyn DocumentStore>,
    path: String,
    cache: Arc<RwLock<GameState>>,
}

/// Handle to a live subscription. Dropping it detaches the listener.
pub struct Subscription {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Detach the listener; no callbacks fire afterwards
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

impl StateSynchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, path: &str) -> Self {
        Self {
            store,
            path: normalize_path(path),
            cache: Arc::new(RwLock::new(GameState::default())),
        }
    }

    /// Last known state (the default until the first notification)
    pub fn snapshot(&self) -> GameState {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attach a listener to the game document.
    ///
    /// `on_change` is called once with the current state (seeding the default
    /// document if none exists) and then after every change.
    pub async fn subscribe<F>(&self, on_change: F) -> StoreResult<Subscription>
    where
        F: Fn(&GameState) + Send + Sync + 'static,
    {
        // Watch before reading so no change between the two is missed
        let mut changes = self.store.watch(&self.path);

        let state = match self.store.get(&self.path).await? {
            Some(doc) => GameState::from_document(Some(&doc)),
            None => seed_default(self.store.as_ref(), &self.path).await?,
        };
        publish(&self.cache, &state);
        on_change(&state);

        let active = Arc::new(AtomicBool::new(true));
        let listener = Listener {
            store: self.store.clone(),
            path: self.path.clone(),
            cache: self.cache.clone(),
            active: active.clone(),
        };

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.path == listener.path => {
                        listener.handle(change.value.as_ref(), &on_change).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "Subscriber fell behind by {} change(s), re-reading {}",
                            skipped,
                            listener.path
                        );
                        match listener.store.get(&listener.path).await {
                            Ok(doc) => listener.handle(doc.as_ref(), &on_change).await,
                            Err(e) => tracing::error!("Failed to re-read game state: {}", e),
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Change stream for {} ended", listener.path);
        });

        Ok(Subscription { active, task })
    }
}

struct Listener {
    store: Arc<dyn DocumentStore>,
    path: String,
    cache: Arc<RwLock<GameState>>,
    active: Arc<AtomicBool>,
}

impl Listener {
    async fn handle<F>(&self, doc: Option<&serde_json::Value>, on_change: &F)
    where
        F: Fn(&GameState),
    {
        if doc.is_none() {
            // Document deleted underneath us; the re-seed arrives as its own change
            if let Err(e) = seed_default(self.store.as_ref(), &self.path).await {
                tracing::error!("Failed to re-seed game state: {}", e);
            }
            return;
        }

        let state = GameState::from_document(doc);
        publish(&self.cache, &state);
        if self.active.load(Ordering::SeqCst) {
            on_change(&state);
        }
    }
}

async fn seed_default(store: &dyn DocumentStore, path: &str) -> StoreResult<GameState> {
    tracing::info!("No game state at {}, seeding default", path);
    let state = GameState::default();
    store.set(path, state.to_document()?).await?;
    Ok(state)
}

fn publish(cache: &RwLock<GameState>, state: &GameState) {
    *cache.write().unwrap_or_else(PoisonError::into_inner) = state.clone();
}
