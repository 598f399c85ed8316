//! Counter server entry point.
//!
//! Initializes logging, loads configuration from environment variables,
//! builds the shared state and serves HTTP + `WebSocket` until `Ctrl-C`.

use std::sync::Arc;

use moo_server::{AppState, ServerConfig, start_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the server fails to
/// bind or serve.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("moo-server starting");

    let config = ServerConfig::from_env()?;
    info!(
        host = config.host,
        port = config.port,
        allow_http_increment = config.allow_http_increment,
        ws_send_timeout_ms = config.ws.send_timeout.as_millis(),
        ws_idle_timeout_ms = config.ws.idle_timeout.map(|t| t.as_millis()),
        ws_outbound_buffer = config.ws.outbound_buffer,
        agent_configured = config.agent.upstream.is_some(),
        agent_model = config.agent.model,
        "configuration loaded"
    );

    let state = Arc::new(AppState::new(&config)?);
    start_server(&config, state).await?;

    info!("moo-server stopped");
    Ok(())
}
