//! Dual-path broadcaster: one `send_event` for whichever transport is live.
//!
//! Decision logic:
//! 1. If a sender is attached and connected, try the fast path. Success
//!    returns `true`.
//! 2. Otherwise schedule one fallback delivery on the current tokio runtime
//!    and return `false`. The fallback outcome is logged, never retried, and
//!    never reported to the caller.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use toolcast_types::{ChannelError, ToolEventEnvelope};
use tracing::{debug, warn};

use crate::fallback::{FallbackRequest, FallbackTransport};
use crate::sender::ChannelSender;

/// Which transport a new envelope would currently take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMode {
    /// Low-latency data channel.
    DataChannel,
    /// HTTP store-and-forward, relayed to subscribers as server-sent events.
    Sse,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataChannel => "dataChannel",
            Self::Sse => "sse",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends envelopes over the fast path when possible, the fallback otherwise.
pub struct DualPathBroadcaster {
    sender: RwLock<Option<Arc<ChannelSender>>>,
    fallback: Arc<dyn FallbackTransport>,
    session_id: Option<String>,
}

impl DualPathBroadcaster {
    /// Create a broadcaster with no sender attached.
    pub fn new(fallback: Arc<dyn FallbackTransport>, session_id: Option<String>) -> Self {
        Self {
            sender: RwLock::new(None),
            fallback,
            session_id,
        }
    }

    /// Attach a sender at construction.
    pub fn with_sender(self, sender: Arc<ChannelSender>) -> Self {
        self.set_sender(Some(sender));
        self
    }

    /// Replace or remove the fast-path sender.
    pub fn set_sender(&self, sender: Option<Arc<ChannelSender>>) {
        *self.sender.write() = sender;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Deliver one envelope.
    ///
    /// Returns `true` only when the fast path accepted it. `false` means a
    /// fallback delivery was scheduled in the background.
    pub fn send_event(&self, envelope: &ToolEventEnvelope) -> bool {
        let sender = self.sender.read().clone();
        if let Some(sender) = sender
            && sender.is_connected()
            && sender.send_event(envelope)
        {
            return true;
        }

        self.schedule_fallback(envelope.clone());
        false
    }

    /// Deliver over the fallback path and wait for the outcome.
    pub async fn send_via_fallback(&self, envelope: &ToolEventEnvelope) -> Result<(), ChannelError> {
        self.fallback.deliver(self.request(envelope.clone())).await
    }

    /// Observability only: derived from current sender connectivity.
    pub fn delivery_mode(&self) -> DeliveryMode {
        match self.sender.read().as_ref() {
            Some(sender) if sender.is_connected() => DeliveryMode::DataChannel,
            _ => DeliveryMode::Sse,
        }
    }

    fn request(&self, event: ToolEventEnvelope) -> FallbackRequest {
        FallbackRequest {
            event,
            session_id: self.session_id.clone(),
        }
    }

    fn schedule_fallback(&self, envelope: ToolEventEnvelope) {
        let tool_id = envelope.tool_id.clone();
        let event_type = envelope.event_type;
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(%tool_id, "no async runtime available, dropping fallback delivery");
            return;
        };

        let fallback = self.fallback.clone();
        let request = self.request(envelope);
        debug!(%tool_id, %event_type, "scheduling fallback delivery");
        handle.spawn(async move {
            match fallback.deliver(request).await {
                Ok(()) => debug!(%tool_id, %event_type, "fallback delivery succeeded"),
                Err(e) => warn!(%tool_id, %event_type, error = %e, "fallback delivery failed"),
            }
        });
    }
}
