//! Admin message handlers
//!
//! Role is checked by the dispatcher before any of these run.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::store::StoreResult;
use crate::types::Gender;
use std::sync::Arc;

/// Map an engine result to an ack or an ADMIN_FAILED error
fn ack(action: &str, result: StoreResult<()>) -> Option<ServerMessage> {
    match result {
        Ok(()) => Some(ServerMessage::AdminAck {
            action: action.to_string(),
        }),
        Err(e) => {
            tracing::error!("Admin action {} failed: {}", action, e);
            Some(ServerMessage::error(
                "ADMIN_FAILED",
                format!("Could not {}, please try again", action.replace('_', " ")),
            ))
        }
    }
}

pub async fn handle_set_lock(state: &Arc<AppState>, locked: bool) -> Option<ServerMessage> {
    ack("set_lock", state.engine.admin_set_lock(locked).await)
}

pub async fn handle_reveal(state: &Arc<AppState>, winner: Option<Gender>) -> Option<ServerMessage> {
    ack("reveal", state.engine.admin_reveal(winner).await)
}

pub async fn handle_reset(state: &Arc<AppState>) -> Option<ServerMessage> {
    ack("reset", state.engine.admin_reset().await)
}

pub async fn handle_set_max_votes(state: &Arc<AppState>, max_votes: u32) -> Option<ServerMessage> {
    ack("set_max_votes", state.engine.admin_set_max_votes(max_votes).await)
}
