//! Transcript to tool invocation, end to end.
//!
//! [`VoiceToolFlow::process_transcript`] detects a trigger, extracts
//! arguments, runs the orchestrator checks, invokes the handler, and turns
//! the result into one spoken sentence. With a broadcaster attached, each
//! lifecycle step is also emitted as an envelope:
//!
//! ```text
//! PROPOSED -> REJECTED
//!          -> ACCEPTED -> EXECUTING -> COMPLETED | ERROR
//! ```
//!
//! All envelopes of one invocation share a fresh tool instance id.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use toolcast_channels::DualPathBroadcaster;
use toolcast_types::{
    EnvelopeMeta, EventPayload, Locale, PayloadValue, ToolEventType, ToolResult, create_envelope,
};
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::feedback::FeedbackHandler;
use crate::orchestrator::ToolOrchestrator;
use crate::registry::ToolRegistry;
use crate::triggers::{TriggerDetector, TriggerMatch};
use crate::voice_feedback::VoiceFeedbackInjector;

/// Builds handler arguments from a transcript.
#[async_trait]
pub trait ArgumentExtractor: Send + Sync {
    async fn extract(
        &self,
        tool_id: &str,
        transcript: &str,
        ctx: &ExecutionContext,
    ) -> Map<String, Value>;
}

/// Passes the raw transcript as `{ "transcript": ... }`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TranscriptExtractor;

#[async_trait]
impl ArgumentExtractor for TranscriptExtractor {
    async fn extract(
        &self,
        _tool_id: &str,
        transcript: &str,
        _ctx: &ExecutionContext,
    ) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("transcript".into(), Value::String(transcript.to_string()));
        args
    }
}

/// What happened to one transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceFlowOutcome {
    /// A trigger matched.
    pub triggered: bool,
    pub tool_id: Option<String>,
    /// Absent when nothing matched.
    pub result: Option<ToolResult>,
    /// Always present; the sentence to speak back.
    pub voice_feedback: String,
}

/// Drives the voice-to-tool pipeline.
pub struct VoiceToolFlow {
    orchestrator: Arc<ToolOrchestrator>,
    detector: TriggerDetector,
    feedback: FeedbackHandler,
    extractor: Arc<dyn ArgumentExtractor>,
    broadcaster: Option<Arc<DualPathBroadcaster>>,
}

impl VoiceToolFlow {
    pub fn new(
        orchestrator: Arc<ToolOrchestrator>,
        detector: TriggerDetector,
        feedback: FeedbackHandler,
    ) -> Self {
        Self {
            orchestrator,
            detector,
            feedback,
            extractor: Arc::new(TranscriptExtractor),
            broadcaster: None,
        }
    }

    /// Wire a flow over one registry with the default collaborators.
    pub fn from_registry(registry: Arc<ToolRegistry>, locale: Locale) -> Self {
        let injector = VoiceFeedbackInjector::new(registry.clone(), locale);
        Self::new(
            Arc::new(ToolOrchestrator::new(registry.clone())),
            TriggerDetector::new(registry),
            FeedbackHandler::new(Arc::new(injector), locale),
        )
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArgumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Emit lifecycle envelopes through `broadcaster`.
    pub fn with_broadcaster(mut self, broadcaster: Arc<DualPathBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub async fn process_transcript(&self, transcript: &str, ctx: &ExecutionContext) -> VoiceFlowOutcome {
        let Some(found) = self.detector.detect(transcript) else {
            return VoiceFlowOutcome {
                triggered: false,
                tool_id: None,
                result: None,
                voice_feedback: self.feedback.not_recognized().to_string(),
            };
        };

        let tool_id = found.tool_id.clone();
        let emitter = Emitter::new(self.broadcaster.as_deref(), &tool_id, ctx);
        emitter.emit(ToolEventType::Proposed, Some(proposal_payload(&found)));

        let args = self.extractor.extract(&tool_id, transcript, ctx).await;
        let result = match self.orchestrator.prepare(&tool_id, args, ctx) {
            Err(rejection) => {
                info!(%tool_id, error = rejection.error.as_deref().unwrap_or(""), "voice tool call rejected");
                emitter.emit(ToolEventType::Rejected, Some(failure_payload(&rejection)));
                rejection
            }
            Ok(call) => {
                emitter.emit(ToolEventType::Accepted, None);
                emitter.emit(ToolEventType::Executing, None);
                let result = self.orchestrator.run(call, ctx).await;
                if result.success {
                    emitter.emit(ToolEventType::Completed, None);
                } else {
                    emitter.emit(ToolEventType::Error, Some(failure_payload(&result)));
                }
                result
            }
        };

        let voice_feedback = self.feedback.generate_feedback(&tool_id, &result);
        VoiceFlowOutcome {
            triggered: true,
            tool_id: Some(tool_id),
            result: Some(result),
            voice_feedback,
        }
    }
}

static INSTANCE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Stamps and sends the envelopes of one invocation.
struct Emitter<'a> {
    broadcaster: Option<&'a DualPathBroadcaster>,
    instance_id: String,
    meta: EnvelopeMeta,
}

impl<'a> Emitter<'a> {
    fn new(broadcaster: Option<&'a DualPathBroadcaster>, tool_id: &str, ctx: &ExecutionContext) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = INSTANCE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            broadcaster,
            instance_id: format!("{tool_id}-{millis}-{seq}"),
            meta: EnvelopeMeta {
                tool_type: Some(tool_id.to_string()),
                session_id: Some(ctx.session_id.clone()).filter(|s| !s.is_empty()),
                maestro_id: ctx.maestro_id.clone(),
            },
        }
    }

    fn emit(&self, event_type: ToolEventType, payload: Option<EventPayload>) {
        let Some(broadcaster) = self.broadcaster else {
            return;
        };
        let envelope = create_envelope(event_type, self.instance_id.as_str(), payload, self.meta.clone());
        let fast = broadcaster.send_event(&envelope);
        debug!(tool_id = %self.instance_id, %event_type, fast, "lifecycle envelope sent");
    }
}

fn proposal_payload(found: &TriggerMatch) -> EventPayload {
    EventPayload::fields([
        ("trigger", PayloadValue::from(found.trigger.as_str())),
        ("fuzzy", PayloadValue::from(found.fuzzy)),
    ])
}

fn failure_payload(result: &ToolResult) -> EventPayload {
    EventPayload::fields([
        ("code", PayloadValue::from(result.error_code().as_str())),
        ("message", PayloadValue::from(result.error.clone().unwrap_or_default())),
    ])
}
