//! Store-and-forward fallback transport.
//!
//! [`FallbackTransport`] is the seam the broadcaster delivers through when
//! the fast path is unavailable. [`HttpFallback`] is the production
//! implementation: one `POST` per envelope, no timeout, no retry.

use async_trait::async_trait;
use serde::Serialize;
use toolcast_types::{ChannelError, FallbackConfig, ToolEventEnvelope};
use tracing::debug;

/// Body of one fallback delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRequest {
    /// The envelope being delivered.
    pub event: ToolEventEnvelope,
    /// Session the envelope belongs to; serialized as `null` when absent.
    pub session_id: Option<String>,
}

/// Delivers an envelope over the slow path.
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    /// Perform one delivery attempt.
    async fn deliver(&self, request: FallbackRequest) -> Result<(), ChannelError>;
}

/// `POST {endpoint}` with a JSON [`FallbackRequest`] body.
#[derive(Debug, Clone)]
pub struct HttpFallback {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFallback {
    /// Create a transport for a full endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Create a transport from the `fallback` config section.
    pub fn from_config(config: &FallbackConfig) -> Self {
        Self::new(config.endpoint())
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl FallbackTransport for HttpFallback {
    async fn deliver(&self, request: FallbackRequest) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChannelError::FallbackFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::FallbackStatus {
                status: status.as_u16(),
            });
        }

        debug!(
            endpoint = %self.endpoint,
            tool_id = %request.event.tool_id,
            status = status.as_u16(),
            "fallback delivery accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolcast_types::ToolEventType;

    #[test]
    fn request_body_shape() {
        let request = FallbackRequest {
            event: ToolEventEnvelope::new(ToolEventType::Proposed, "quiz_1", 5),
            session_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["event"]["toolId"], "quiz_1");
        assert!(json["sessionId"].is_null());
        assert!(json.as_object().unwrap().contains_key("sessionId"));
    }

    #[test]
    fn endpoint_from_config() {
        let transport = HttpFallback::from_config(&FallbackConfig::default());
        assert_eq!(transport.endpoint(), "http://localhost:3000/api/tools/events");
    }
}
