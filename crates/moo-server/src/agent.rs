//! Agent query proxy for the frontend cow.
//!
//! `GET /api/query` asks an OpenAI-compatible chat-completion upstream
//! which action the cow should take next. The endpoint follows a
//! **best-effort upstream with random fallback** policy: when the
//! upstream is not configured, the caller asks for the fallback, the
//! request fails, the status is not 200, or the reply has no
//! `choices[0].message.content`, the answer is an action drawn uniformly
//! from [`DEFAULT_ACTIONS`]. The caller always gets an action, never an
//! error. [`ActionSource`] records which branch produced it.

use rand::seq::IndexedRandom;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, UpstreamConfig};
use crate::error::ApiError;
use crate::prompt::PromptEngine;

/// Actions the cow always has available.
pub const DEFAULT_ACTIONS: [&str; 7] = [
    "graze",
    "move_up",
    "move_down",
    "move_left",
    "move_right",
    "moo_loud",
    "moo_soft",
];

/// Situation used when the caller does not describe one.
pub const DEFAULT_SITUATION: &str = "You are standing in a grassy field under a clear blue sky.";

/// Parameters of one agent query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentQuery {
    /// What the cow is experiencing. `None` uses [`DEFAULT_SITUATION`].
    pub situation: Option<String>,
    /// Actions offered in addition to [`DEFAULT_ACTIONS`].
    pub extra_actions: Vec<String>,
    /// Skip the upstream and pick a random default action.
    pub fallback: bool,
}

impl AgentQuery {
    /// Build a query from raw query-string pairs.
    ///
    /// `situation` and `fallback` take their first occurrence;
    /// `extra_actions` may repeat. `fallback` counts as set when its
    /// value is non-empty. Unknown keys are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        let mut situation = None;
        let mut fallback = None;
        let mut extra_actions = Vec::new();

        for (key, value) in pairs {
            match key.as_str() {
                "situation" => {
                    situation.get_or_insert_with(|| value.clone());
                }
                "fallback" => {
                    fallback.get_or_insert(!value.is_empty());
                }
                "extra_actions" => extra_actions.push(value.clone()),
                _ => {}
            }
        }

        Self {
            situation,
            extra_actions,
            fallback: fallback.unwrap_or(false),
        }
    }
}

/// Why the random fallback answered a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No upstream URL and key are configured.
    NotConfigured,
    /// The caller set the `fallback` flag.
    Requested,
    /// The prompt could not be rendered.
    Prompt(String),
    /// The HTTP request failed (connect, timeout, body read).
    Request(String),
    /// The upstream answered with a status other than 200.
    Status(u16),
    /// The upstream reply did not carry an action.
    Malformed(String),
}

/// Which branch of the policy produced an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSource {
    /// The upstream model chose it.
    Upstream,
    /// Drawn from [`DEFAULT_ACTIONS`].
    Fallback(FallbackReason),
}

/// The answer to an agent query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAction {
    /// The chosen action identifier.
    pub action: String,
    /// Where it came from.
    pub source: ActionSource,
}

/// Client for the chat-completion upstream.
pub struct CowAgent {
    client: reqwest::Client,
    upstream: Option<UpstreamConfig>,
    model: String,
    prompts: PromptEngine,
}

impl CowAgent {
    /// Create an agent from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if the HTTP client or the prompt
    /// templates cannot be built.
    pub fn new(config: &AgentConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            upstream: config.upstream.clone(),
            model: config.model.clone(),
            prompts: PromptEngine::new()?,
        })
    }

    /// Whether an upstream is configured.
    pub const fn is_configured(&self) -> bool {
        self.upstream.is_some()
    }

    /// Answer a query, falling back to a random default action on any
    /// upstream problem.
    pub async fn choose_action(&self, query: &AgentQuery) -> AgentAction {
        match self.ask_upstream(query).await {
            Ok(action) => AgentAction {
                action,
                source: ActionSource::Upstream,
            },
            Err(reason) => {
                match &reason {
                    FallbackReason::NotConfigured | FallbackReason::Requested => {
                        debug!(?reason, "answering agent query with random action");
                    }
                    _ => warn!(?reason, "agent upstream failed, answering with random action"),
                }
                AgentAction {
                    action: random_default_action(),
                    source: ActionSource::Fallback(reason),
                }
            }
        }
    }

    async fn ask_upstream(&self, query: &AgentQuery) -> Result<String, FallbackReason> {
        let Some(upstream) = &self.upstream else {
            return Err(FallbackReason::NotConfigured);
        };
        if query.fallback {
            return Err(FallbackReason::Requested);
        }

        let situation = query.situation.as_deref().unwrap_or(DEFAULT_SITUATION);
        let actions: Vec<String> = DEFAULT_ACTIONS
            .iter()
            .map(|a| (*a).to_owned())
            .chain(query.extra_actions.iter().cloned())
            .collect();

        info!(
            situation,
            extra_actions = ?query.extra_actions,
            "agent query"
        );

        let prompt = self
            .prompts
            .render(situation, &actions)
            .map_err(|e| FallbackReason::Prompt(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user}
            ],
            "stream": false
        });

        let response = self
            .client
            .post(format!("{}/api/chat/completions", upstream.api_url))
            .bearer_auth(&upstream.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FallbackReason::Request(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FallbackReason::Status(status.as_u16()));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| FallbackReason::Malformed(format!("response parse failed: {e}")))?;

        log_thinking_blocks(&json);

        extract_content(&json)
            .map(|content| content.trim().to_owned())
            .ok_or_else(|| {
                FallbackReason::Malformed("missing choices[0].message.content".to_owned())
            })
    }

    /// Fetch the upstream model list verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotConfigured`] without an upstream and
    /// [`ApiError::Upstream`] if the request fails or is not successful.
    pub async fn list_models(&self) -> Result<Value, ApiError> {
        let upstream = self.upstream.as_ref().ok_or_else(|| {
            ApiError::NotConfigured("Open WebUI API key or URL not configured.".to_owned())
        })?;

        let response = self
            .client
            .get(format!("{}/api/models", upstream.api_url))
            .bearer_auth(&upstream.api_key)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("models request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Upstream(format!(
                "Failed to fetch models from Open WebUI (status {status})."
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("models response parse failed: {e}")))
    }
}

/// Extract the text content from a chat completions response.
fn extract_content(json: &Value) -> Option<&str> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
}

/// Log any reasoning the upstream attached to its reply.
fn log_thinking_blocks(json: &Value) {
    let blocks = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("thinking_blocks"))
        .and_then(Value::as_array);

    for thinking in blocks
        .into_iter()
        .flatten()
        .filter_map(|block| block.get("thinking").and_then(Value::as_str))
        .filter(|t| !t.is_empty())
    {
        info!(thinking, "agent thinking block");
    }
}

/// Pick one of [`DEFAULT_ACTIONS`] uniformly at random.
pub fn random_default_action() -> String {
    DEFAULT_ACTIONS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("graze")
        .to_owned()
}
