//! Courier delivery server
//!
//! Long-poll mailbox service for chat events on hosting that cannot keep
//! sockets open. Senders POST; recipients poll.

pub mod auth;
pub mod config;
pub mod ctx;
pub mod error;
pub mod handlers;
pub mod realtime;
pub mod router;
pub mod store;

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::TokenAuthenticator;
use config::{AppState, CourierConfig};
use realtime::Realtime;
use store::{ConversationStore, JsonConversationStore};

pub use error::{Error, Result};
pub use router::router;

/// Install the global tracing subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        // Already set, ignore
    }
}

/// Build shared state from configuration.
pub async fn build_state(config: CourierConfig) -> anyhow::Result<AppState> {
    config.ensure_dirs()?;

    let store: Arc<dyn ConversationStore> = match &config.data_dir {
        Some(root) => {
            info!("Storage directory: {:?}", root);
            Arc::new(JsonConversationStore::new(root.clone()).await?)
        }
        None => {
            info!("Storage: in-memory only");
            Arc::new(JsonConversationStore::in_memory())
        }
    };

    let auth = Arc::new(TokenAuthenticator::new(config.tokens.clone()));
    info!("Authenticator initialized with {} token(s)", auth.len());

    let realtime = Arc::new(Realtime::new(&config));

    Ok(AppState {
        config,
        store,
        auth,
        realtime,
    })
}

pub async fn run(config: CourierConfig) -> anyhow::Result<()> {
    info!("=== Courier Server ===");

    let addr = config.addr;
    let sweep_interval = config.sweep_interval;
    let state = build_state(config).await?;

    let sweeper = realtime::spawn_sweeper(state.realtime.clone(), sweep_interval);
    let app = router(state);

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Courier Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
