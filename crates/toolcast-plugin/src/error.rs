//! Plugin error types.
//!
//! [`PluginError`] is what handlers and registry operations return. The
//! orchestrator never lets it escape: every handler error is folded into a
//! [`ToolResult`](toolcast_types::ToolResult) with an error code.

use thiserror::Error;

/// Errors produced by plugin definitions and handlers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// A plugin definition was rejected at registration.
    #[error("invalid plugin definition '{id}': {reason}")]
    InvalidDefinition {
        /// Id of the rejected plugin (may be empty).
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Plugin execution failed at runtime.
    #[error("plugin execution failed: {0}")]
    ExecutionFailed(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
