//! HTTP endpoint for the group chat simulator.
//!
//! Serves `POST /api/chat`, which turns a user message, the room's memory
//! text and its roster into a JSON array of persona replies.

pub mod api;
pub mod config;

pub use api::{router, ApiError, AppState, CHAT_PATH};
pub use config::{ConfigError, ServerConfig};

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Bind the listener and serve until Ctrl-C.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    config.validate()?;

    let state = AppState::from_config(&config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Chat endpoint listening on http://{}{}", config.listen_addr, CHAT_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
