//! REST endpoint handlers for the counter server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Liveness text |
//! | `GET` | `/api/counter` | Current count |
//! | `POST` | `/api/increment` | Increment and broadcast (when enabled) |
//! | `GET` | `/api/query` | Agent action, with random fallback |
//! | `GET` | `/api/models` | Upstream model list passthrough |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::agent::AgentQuery;
use crate::error::ApiError;
use crate::state::AppState;

/// Body of the counter endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    /// The counter value.
    pub count: u64,
}

/// Body of `GET /api/query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// The action the cow should take.
    pub action: String,
}

/// Liveness text.
pub async fn index() -> &'static str {
    "Server is running."
}

/// Read the counter. Never touches the session registry.
pub async fn get_counter(State(state): State<Arc<AppState>>) -> Json<CountResponse> {
    Json(CountResponse {
        count: state.hub.count(),
    })
}

/// Increment the counter, broadcast the new value, and return it.
pub async fn increment(State(state): State<Arc<AppState>>) -> Json<CountResponse> {
    Json(CountResponse {
        count: state.hub.increment_and_broadcast(),
    })
}

/// Ask the agent for the cow's next action.
///
/// Accepts `situation`, repeated `extra_actions` and `fallback` query
/// parameters. Always answers 200.
pub async fn query_agent(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Json<ActionResponse> {
    let query = AgentQuery::from_pairs(&pairs);
    let answer = state.agent.choose_action(&query).await;
    Json(ActionResponse {
        action: answer.action,
    })
}

/// Pass the upstream model list through.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.agent.list_models().await.map(Json)
}
