//! Configuration types for the counter server.
//!
//! All configuration is loaded from environment variables. Nothing is
//! required: an unconfigured server listens on `0.0.0.0:5000`, serves the
//! counter read-only over HTTP, and answers agent queries with the random
//! fallback.

use std::str::FromStr;
use std::time::Duration;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid {name}: {message}")]
    Invalid {
        /// The environment variable name.
        name: String,
        /// What went wrong parsing it.
        message: String,
    },
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// The TCP port to listen on.
    pub port: u16,
    /// Whether `POST /api/increment` is routed.
    pub allow_http_increment: bool,
    /// Streaming session settings.
    pub ws: WsConfig,
    /// Agent query proxy settings.
    pub agent: AgentConfig,
}

/// Settings for each streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsConfig {
    /// Longest a single frame write may take before the peer is dropped.
    pub send_timeout: Duration,
    /// Close sessions that send nothing for this long. `None` disables.
    pub idle_timeout: Option<Duration>,
    /// Undelivered messages a session may accumulate before eviction.
    pub outbound_buffer: usize,
}

/// Settings for the agent query proxy.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upstream chat-completion service. `None` means every query falls
    /// back to a random action.
    pub upstream: Option<UpstreamConfig>,
    /// Model identifier sent upstream.
    pub model: String,
    /// Overall deadline for one upstream request.
    pub request_timeout: Duration,
}

/// Location and credentials of the upstream chat-completion service.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Base URL (e.g. `https://webui.example.com`).
    pub api_url: String,
    /// Bearer token.
    pub api_key: String,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Default model identifier for agent queries.
pub const DEFAULT_MODEL: &str = "protected.Claude Sonnet 4";

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(5000),
            idle_timeout: None,
            outbound_buffer: 64,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            upstream: None,
            model: DEFAULT_MODEL.to_owned(),
            request_timeout: Duration::from_millis(10_000),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 5000,
            allow_http_increment: false,
            ws: WsConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional variables:
    /// - `HOST` -- bind address (default `0.0.0.0`)
    /// - `PORT` -- listen port (default 5000)
    /// - `ALLOW_HTTP_INCREMENT` -- route `POST /api/increment` (default `false`)
    /// - `WS_SEND_TIMEOUT_MS` -- per-frame write deadline (default 5000)
    /// - `WS_IDLE_TIMEOUT_MS` -- idle session deadline (default: none)
    /// - `WS_OUTBOUND_BUFFER` -- per-session queue size (default 64)
    /// - `OPEN_WEB_URL` / `OPEN_WEB_API_KEY` -- agent upstream (both needed)
    /// - `LLM_MODEL` -- upstream model (default [`DEFAULT_MODEL`])
    /// - `LLM_TIMEOUT_MS` -- upstream request deadline (default 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let host = var("HOST").unwrap_or(defaults.host);
        let port = parse_or(&var, "PORT", defaults.port)?;
        let allow_http_increment =
            parse_or(&var, "ALLOW_HTTP_INCREMENT", defaults.allow_http_increment)?;

        let ws = WsConfig {
            send_timeout: Duration::from_millis(parse_or(&var, "WS_SEND_TIMEOUT_MS", 5000)?),
            idle_timeout: parse_opt::<u64>(&var, "WS_IDLE_TIMEOUT_MS")?
                .map(Duration::from_millis),
            outbound_buffer: parse_or(&var, "WS_OUTBOUND_BUFFER", defaults.ws.outbound_buffer)?,
        };

        let upstream = match (var("OPEN_WEB_URL"), var("OPEN_WEB_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(UpstreamConfig {
                api_url: api_url.trim_end_matches('/').to_owned(),
                api_key,
            }),
            _ => None,
        };

        let agent = AgentConfig {
            upstream,
            model: var("LLM_MODEL").unwrap_or(defaults.agent.model),
            request_timeout: Duration::from_millis(parse_or(&var, "LLM_TIMEOUT_MS", 10_000)?),
        };

        Ok(Self {
            host,
            port,
            allow_http_increment,
            ws,
            agent,
        })
    }
}

/// Parse an optional variable.
fn parse_opt<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                name: name.to_owned(),
                message: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}

/// Parse a variable, falling back to `default` when it is unset.
fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(var, name)?.unwrap_or(default))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert!(!config.allow_http_increment);
        assert_eq!(config.ws, WsConfig::default());
        assert!(config.agent.upstream.is_none());
        assert_eq!(config.agent.model, DEFAULT_MODEL);
    }

    #[test]
    fn reads_every_variable() {
        let config = load(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8081"),
            ("ALLOW_HTTP_INCREMENT", "true"),
            ("WS_SEND_TIMEOUT_MS", "250"),
            ("WS_IDLE_TIMEOUT_MS", "60000"),
            ("WS_OUTBOUND_BUFFER", "8"),
            ("OPEN_WEB_URL", "http://webui.local/"),
            ("OPEN_WEB_API_KEY", "secret"),
            ("LLM_MODEL", "tiny"),
            ("LLM_TIMEOUT_MS", "1500"),
        ])
        .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8081);
        assert!(config.allow_http_increment);
        assert_eq!(config.ws.send_timeout, Duration::from_millis(250));
        assert_eq!(config.ws.idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.ws.outbound_buffer, 8);
        let upstream = config.agent.upstream.unwrap();
        assert_eq!(upstream.api_url, "http://webui.local");
        assert_eq!(upstream.api_key, "secret");
        assert_eq!(config.agent.model, "tiny");
        assert_eq!(config.agent.request_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn upstream_needs_both_url_and_key() {
        let config = load(&[("OPEN_WEB_URL", "http://webui.local")]).unwrap();
        assert!(config.agent.upstream.is_none());

        let config = load(&[("OPEN_WEB_URL", "http://webui.local"), ("OPEN_WEB_API_KEY", "")]).unwrap();
        assert!(config.agent.upstream.is_none());
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err = load(&[("ALLOW_HTTP_INCREMENT", "yes please")]).unwrap_err();
        assert!(err.to_string().contains("ALLOW_HTTP_INCREMENT"));
    }

    #[test]
    fn api_key_is_not_debug_printed() {
        let upstream = UpstreamConfig {
            api_url: "http://webui.local".to_owned(),
            api_key: "secret".to_owned(),
        };
        assert!(!format!("{upstream:?}").contains("secret"));
    }
}
