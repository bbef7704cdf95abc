use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use babyvote::{
    auth, broadcast,
    config::{ServerConfig, StoreConfig},
    llm,
    state::AppState,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "babyvote=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting babyvote...");

    let server_config = ServerConfig::from_env();
    let store_config = StoreConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());

    let llm_manager = match llm::LlmConfig::from_env().build_manager() {
        Ok(manager) => {
            let names: Vec<&str> = manager.providers.iter().map(|p| p.name()).collect();
            tracing::info!("LLM providers initialized: {}", names.join(", "));
            Some(manager)
        }
        Err(e) => {
            tracing::warn!("{}. Guests will get a fixed message instead of a whisper.", e);
            None
        }
    };

    let store = match store_config.open().await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open {} store: {}", store_config.state_path, e);
            return;
        }
    };

    let state = Arc::new(AppState::new(store, &store_config.state_path, llm_manager));

    // Seeds the document and starts pushing changes to connected clients
    if let Err(e) = broadcast::spawn_state_broadcaster(state.clone()).await {
        tracing::error!("Failed to subscribe to game state: {}", e);
        return;
    }

    let app = babyvote::app(state, auth_config, &server_config.static_dir);

    tracing::info!("Listening on http://{}", server_config.bind_addr);
    let listener = match tokio::net::TcpListener::bind(server_config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", server_config.bind_addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
