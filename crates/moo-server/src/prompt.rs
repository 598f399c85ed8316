//! Prompt rendering for agent queries via `minijinja`.
//!
//! The cow has one system prompt listing its available actions and one
//! user prompt describing its situation. Both are compiled into the
//! binary.

use minijinja::{Environment, context};

use crate::error::ApiError;

const SYSTEM_TEMPLATE: &str = "\
You are a cow currently residing on a grassy field under a clear blue sky. \
The user is not a human but rather an embodiment of your own consciousness and external perception, \
existing to help you make decisions.

Here are the available actions you can take:
{% for action in actions %}- {{ action }}
{% endfor %}
Respond with only the action you choose to take, exactly as a short identifier \
(e.g., \"graze\", \"move_up\"). Do not include any additional text or explanation.
";

const USER_TEMPLATE: &str = "\
Here is your current situation:
{{ situation }}
";

/// System and user messages for one upstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// System message listing the available actions.
    pub system: String,
    /// User message describing the situation.
    pub user: String,
}

/// Holds the compiled agent prompt templates.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Compile the built-in templates.
    pub fn new() -> Result<Self, ApiError> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .map_err(|e| ApiError::Internal(format!("failed to add system template: {e}")))?;
        env.add_template("user", USER_TEMPLATE)
            .map_err(|e| ApiError::Internal(format!("failed to add user template: {e}")))?;
        Ok(Self { env })
    }

    /// Render both messages.
    pub fn render(&self, situation: &str, actions: &[String]) -> Result<RenderedPrompt, ApiError> {
        let system = self
            .env
            .get_template("system")
            .map_err(|e| ApiError::Internal(format!("missing system template: {e}")))?
            .render(context! { actions => actions })
            .map_err(|e| ApiError::Internal(format!("system render failed: {e}")))?;

        let user = self
            .env
            .get_template("user")
            .map_err(|e| ApiError::Internal(format!("missing user template: {e}")))?
            .render(context! { situation => situation })
            .map_err(|e| ApiError::Internal(format!("user render failed: {e}")))?;

        Ok(RenderedPrompt { system, user })
    }
}
