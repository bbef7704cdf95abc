//! Process configuration from environment variables.
//!
//! Blank values count as unset. LLM and admin credentials have their own
//! `from_env` constructors in their modules.

use crate::store::{
    DocumentStore, FirebaseConfig, FirebaseStore, MemoryStore, StoreResult, DEFAULT_MAX_RETRIES,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_STATE_PATH: &str = "gender_reveal/gameState";

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Served for every path without a route
    pub static_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let default_addr = SocketAddr::from(([0, 0, 0, 0], 8080));
        let bind_addr = match env_value("BIND_ADDR") {
            Some(addr) => addr.parse().unwrap_or_else(|e| {
                tracing::warn!(
                    "Invalid BIND_ADDR {:?} ({}), using {}",
                    addr,
                    e,
                    DEFAULT_BIND_ADDR
                );
                default_addr
            }),
            None => default_addr,
        };

        Self {
            bind_addr,
            static_dir: env_value("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
        }
    }
}

/// Which document store backs the game and where the document lives
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub state_path: String,
    /// Snapshot file for the in-process store
    pub state_file: Option<PathBuf>,
    pub max_retries: u32,
    /// Selects the Firebase store when present
    pub firebase: Option<FirebaseConfig>,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            state_path: env_value("STATE_PATH").unwrap_or_else(|| DEFAULT_STATE_PATH.to_string()),
            state_file: env_value("STATE_FILE").map(PathBuf::from),
            max_retries: env_value("MAX_TRANSACTION_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            firebase: FirebaseConfig::from_env(),
        }
    }

    /// Construct the configured store
    pub async fn open(&self) -> StoreResult<Arc<dyn DocumentStore>> {
        if let Some(firebase) = &self.firebase {
            tracing::info!("Using Firebase store at {}", firebase.database_url);
            return Ok(Arc::new(FirebaseStore::new(
                firebase.clone(),
                self.max_retries,
            )?));
        }

        let store = match &self.state_file {
            Some(path) => {
                tracing::info!("Using in-memory store persisted to {}", path.display());
                MemoryStore::open(path.clone()).await?
            }
            None => {
                tracing::warn!("Using in-memory store without persistence; set STATE_FILE to keep votes across restarts");
                MemoryStore::new()
            }
        };
        Ok(Arc::new(store.with_max_retries(self.max_retries)))
    }
}
