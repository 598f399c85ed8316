//! Shared application state for the counter server.
//!
//! [`AppState`] owns the [`Hub`] (counter plus session registry) and the
//! agent client. It is wrapped in an [`Arc`](std::sync::Arc) and injected
//! into handlers via Axum's `State` extractor, so every connection works
//! against the same explicitly-owned objects.

use moo_core::{Hub, SessionOptions};

use crate::agent::CowAgent;
use crate::config::{ServerConfig, WsConfig};
use crate::error::ApiError;

/// Shared state for the Axum application.
pub struct AppState {
    /// The counter and the live session registry.
    pub hub: Hub,
    /// The agent query client.
    pub agent: CowAgent,
    /// Streaming session settings.
    pub ws: WsConfig,
    /// Whether `POST /api/increment` is routed.
    pub allow_http_increment: bool,
}

impl AppState {
    /// Create state with a fresh counter at zero.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if the agent client cannot be built.
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        Self::with_hub(Hub::new(), config)
    }

    /// Create state around an existing hub.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if the agent client cannot be built.
    pub fn with_hub(hub: Hub, config: &ServerConfig) -> Result<Self, ApiError> {
        Ok(Self {
            hub,
            agent: CowAgent::new(&config.agent)?,
            ws: config.ws,
            allow_http_increment: config.allow_http_increment,
        })
    }

    /// Serving-loop options derived from the WebSocket settings.
    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            idle_timeout: self.ws.idle_timeout,
        }
    }
}
