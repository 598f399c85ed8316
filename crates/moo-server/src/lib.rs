//! HTTP + `WebSocket` server for the moo counter service.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **`WebSocket` endpoint** (`/api/ws`) where each connection joins the
//!   live session registry, receives the current count, and may send
//!   `count_moo` to increment it for everyone
//! - **REST endpoints** for reading (and optionally incrementing) the
//!   counter
//! - **Agent endpoints** proxying an upstream chat-completion service,
//!   answering with a random action whenever the upstream is unavailable
//!
//! # Architecture
//!
//! All shared state lives in [`AppState`], created once and handed to
//! every handler through Axum's `State` extractor. The concurrency core
//! (counter, registry, serving loop) lives in [`moo_core`]; this crate
//! only adapts it to HTTP and `WebSocket` frames.

pub mod agent;
pub mod config;
pub mod error;
pub mod handlers;
pub mod prompt;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerError, serve, start_server};
pub use state::AppState;
