// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod llm;
pub mod protocol;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;
pub mod ws;

use axum::{middleware, routing::get, Router};
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// HTTP and WebSocket routes; unknown paths are served from `static_dir`
pub fn app(
    state: Arc<state::AppState>,
    auth_config: Arc<auth::AuthConfig>,
    static_dir: &Path,
) -> Router {
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            auth_config,
            auth::admin_ws_auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/api/state", get(api::get_state))
        .route("/api/tally", get(api::get_tally))
        .route("/api/state/export", get(api::export_state));

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
