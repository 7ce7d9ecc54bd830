//! Tool-event envelope: the wire message exchanged over both transports.
//!
//! An envelope reports one lifecycle step of one tool instance. The event
//! kind is a closed enum and the payload is deliberately shallow (a flat
//! map of primitives or a single primitive) so its size stays predictable.
//!
//! [`deserialize`] never fails loudly: malformed or structurally invalid
//! input yields `None`, because envelopes arrive from transports the
//! consumer does not fully trust.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::EnvelopeError;

// ---------------------------------------------------------------------------
// ToolEventType
// ---------------------------------------------------------------------------

/// Lifecycle step reported by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolEventType {
    /// The assistant proposed running a tool.
    Proposed,
    /// Every pre-execution check passed.
    Accepted,
    /// A pre-execution check failed; the handler will not run.
    Rejected,
    /// The handler is running.
    Executing,
    /// The handler finished successfully.
    Completed,
    /// The handler failed or timed out.
    Error,
}

impl ToolEventType {
    /// Every known kind, in lifecycle order.
    pub const ALL: [ToolEventType; 6] = [
        Self::Proposed,
        Self::Accepted,
        Self::Rejected,
        Self::Executing,
        Self::Completed,
        Self::Error,
    ];

    /// Wire name of this kind (e.g. `"EXECUTING"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "PROPOSED",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Executing => "EXECUTING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        }
    }

    /// Parse a wire name. Matching is exact; unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether no further envelopes follow this one for the same tool.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Error)
    }
}

impl fmt::Display for ToolEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A single primitive payload value.
///
/// There is no null: an absent value is an absent key, and a scalar
/// payload that could not be represented is no payload at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    /// Boolean.
    Bool(bool),
    /// Integer or floating point number.
    Number(serde_json::Number),
    /// UTF-8 string.
    String(String),
}

impl PayloadValue {
    /// String content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value the way it reads in a sentence.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for PayloadValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl TryFrom<f64> for PayloadValue {
    type Error = EnvelopeError;

    /// Non-finite floats have no JSON representation and are refused.
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        serde_json::Number::from_f64(value)
            .map(Self::Number)
            .ok_or_else(|| EnvelopeError::Invalid(format!("payload number {value} is not finite")))
    }
}

/// Envelope payload: a flat string-keyed map of primitives, or one primitive.
///
/// Nested objects and arrays are not representable, which is what keeps
/// the payload shallow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// Flat key -> primitive mapping.
    Fields(BTreeMap<String, PayloadValue>),
    /// A single string, number, or boolean.
    Scalar(PayloadValue),
}

impl EventPayload {
    /// Build a flat map payload.
    pub fn fields<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<PayloadValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Fields(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a single-primitive payload.
    pub fn scalar(value: impl Into<PayloadValue>) -> Self {
        Self::Scalar(value.into())
    }

    /// Look up a field of a map payload.
    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        match self {
            Self::Fields(map) => map.get(key),
            Self::Scalar(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Optional correlation metadata attached at creation time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeMeta {
    /// Tool kind (e.g. `"quiz"`, `"mindmap"`).
    pub tool_type: Option<String>,
    /// Voice session the tool belongs to.
    pub session_id: Option<String>,
    /// Tutor persona that triggered the tool.
    pub maestro_id: Option<String>,
}

/// The structured tool-lifecycle message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEventEnvelope {
    /// Lifecycle kind.
    #[serde(rename = "type")]
    pub event_type: ToolEventType,

    /// Identifier of the tool instance. Never empty.
    pub tool_id: String,

    /// Tool kind, opaque to the protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,

    /// Session correlation id, opaque to the protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Tutor correlation id, opaque to the protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maestro_id: Option<String>,

    /// Shallow payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,

    /// Producer wall clock in milliseconds since the Unix epoch.
    ///
    /// An ordering hint only: envelopes that travel different transports
    /// may arrive out of timestamp order.
    pub timestamp: i64,
}

impl ToolEventEnvelope {
    /// Build an envelope with an explicit timestamp and no metadata.
    pub fn new(event_type: ToolEventType, tool_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            event_type,
            tool_id: tool_id.into(),
            tool_type: None,
            session_id: None,
            maestro_id: None,
            payload: None,
            timestamp,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach correlation metadata, replacing any already set.
    pub fn with_meta(mut self, meta: EnvelopeMeta) -> Self {
        self.tool_type = meta.tool_type;
        self.session_id = meta.session_id;
        self.maestro_id = meta.maestro_id;
        self
    }

    /// Idempotency key for order-tolerant consumers: `(toolId, type)`.
    pub fn dedup_key(&self) -> (&str, ToolEventType) {
        (&self.tool_id, self.event_type)
    }
}

/// Create an envelope stamped with the current wall clock.
pub fn create_envelope(
    event_type: ToolEventType,
    tool_id: impl Into<String>,
    payload: Option<EventPayload>,
    meta: EnvelopeMeta,
) -> ToolEventEnvelope {
    let mut envelope =
        ToolEventEnvelope::new(event_type, tool_id, chrono::Utc::now().timestamp_millis())
            .with_meta(meta);
    envelope.payload = payload;
    envelope
}

/// Encode an envelope as JSON.
pub fn serialize(envelope: &ToolEventEnvelope) -> Result<String, EnvelopeError> {
    serde_json::to_string(envelope).map_err(EnvelopeError::Serialize)
}

/// Decode and validate an envelope. Any violation yields `None`.
pub fn deserialize(raw: &str) -> Option<ToolEventEnvelope> {
    let mut value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "tool event is not valid JSON");
            return None;
        }
    };

    if let Err(e) = validate(&mut value) {
        debug!(error = %e, "dropping structurally invalid tool event");
        return None;
    }

    match serde_json::from_value(value) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            debug!(error = %e, "tool event fields do not match the envelope shape");
            None
        }
    }
}

/// Check the required fields and normalize a whole-number float timestamp.
fn validate(value: &mut Value) -> Result<(), EnvelopeError> {
    let Some(obj) = value.as_object_mut() else {
        return Err(EnvelopeError::Invalid("envelope must be a JSON object".into()));
    };

    match obj.get("type").and_then(Value::as_str) {
        Some(name) if ToolEventType::parse(name).is_some() => {}
        Some(name) => {
            return Err(EnvelopeError::Invalid(format!("unknown event type '{name}'")));
        }
        None => return Err(EnvelopeError::Invalid("type is required".into())),
    }

    match obj.get("toolId").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => {}
        _ => return Err(EnvelopeError::Invalid("toolId is required".into())),
    }

    let timestamp = match obj.get("timestamp") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        _ => None,
    };
    let Some(timestamp) = timestamp else {
        return Err(EnvelopeError::Invalid("timestamp must be an integer".into()));
    };
    obj.insert("timestamp".into(), Value::from(timestamp));

    Ok(())
}
