//! Axum router construction for the counter server.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin frontend access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- liveness text
/// - `GET /api/counter` -- current count
/// - `POST /api/increment` -- only when HTTP increments are enabled
/// - `GET /api/ws` -- `WebSocket` counter session
/// - `GET /api/query` -- agent action
/// - `GET /api/models` -- upstream model list
///
/// CORS allows any origin.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/", get(handlers::index))
        // Counter
        .route("/api/counter", get(handlers::get_counter))
        .route("/api/ws", get(ws::ws_counter))
        // Agent
        .route("/api/query", get(handlers::query_agent))
        .route("/api/models", get(handlers::list_models));

    let router = if state.allow_http_increment {
        router.route("/api/increment", post(handlers::increment))
    } else {
        router
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
