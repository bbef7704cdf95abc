//! Read-only HTTP endpoints for the game state.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::state::AppState;
use crate::store::StoreError;

fn store_failure(e: StoreError) -> Response {
    tracing::error!("Failed to read game state: {}", e);
    (StatusCode::SERVICE_UNAVAILABLE, "Connection error").into_response()
}

/// Current game state.
///
/// GET /api/state
pub async fn get_state(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.current_state().await {
        Ok(game) => Json(game).into_response(),
        Err(e) => store_failure(e),
    }
}

/// Vote counts per choice.
///
/// GET /api/tally
pub async fn get_tally(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.current_state().await {
        Ok(game) => Json(game.tally()).into_response(),
        Err(e) => store_failure(e),
    }
}

/// Export the game state as JSON.
///
/// GET /api/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> Response {
    match state.export_state().await {
        Ok(export) => Json(export).into_response(),
        Err(e) => store_failure(e),
    }
}
