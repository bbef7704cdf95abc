//! Downloadable snapshot of the game document.

use super::AppState;
use crate::store::StoreResult;
use crate::types::GameState;
use serde::{Deserialize, Serialize};

/// Schema version for export format compatibility
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateExport {
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    pub state: GameState,
}

impl AppState {
    /// Snapshot of the authoritative state, read straight from the store
    pub async fn export_state(&self) -> StoreResult<StateExport> {
        let state = self.engine.current_state().await?;
        tracing::info!("Exporting game state with {} vote(s)", state.votes.len());

        Ok(StateExport {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            state,
        })
    }
}
