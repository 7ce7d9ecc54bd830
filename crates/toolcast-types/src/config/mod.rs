//! Configuration schema for toolcast.
//!
//! Every field has a default, so an empty `{}` (or no file at all) yields a
//! usable config. Keys may be written in snake_case or camelCase.

mod loader;

pub use loader::{CONFIG_ENV_VAR, discover_config_path, load_config, load_config_from};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolcastConfig {
    /// Fallback (store-and-forward) endpoint.
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Orchestrator limits.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Spoken feedback settings.
    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Session defaults.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Where fallback deliveries are POSTed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Scheme, host, and port of the endpoint.
    #[serde(default = "default_base_url", alias = "baseUrl")]
    pub base_url: String,

    /// Path of the events endpoint.
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_base_url() -> String {
    "http://localhost:3000".into()
}

fn default_path() -> String {
    "/api/tools/events".into()
}

impl FallbackConfig {
    /// Full endpoint URL, joining base and path with exactly one slash.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path: default_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-invocation handler time budget in milliseconds.
    #[serde(default = "default_handler_timeout_ms", alias = "handlerTimeoutMs")]
    pub handler_timeout_ms: u64,
}

fn default_handler_timeout_ms() -> u64 {
    30_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: default_handler_timeout_ms(),
        }
    }
}

/// Language of the spoken sentences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// Italian.
    #[default]
    It,
    /// English.
    En,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session id the broadcaster attaches to fallback deliveries.
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}
