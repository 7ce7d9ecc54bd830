//! Consumer-side tool state.
//!
//! [`ToolStateStore`] keeps one [`ToolState`] per tool instance and can be
//! driven directly (create, update, complete, fail, cancel) or by folding
//! received envelopes with [`ToolStateStore::apply`].
//!
//! Envelopes are treated as idempotent, order-tolerant signals keyed by
//! `(toolId, type)`. A repeated pair is a no-op, and once a tool reaches a
//! terminal status a late non-terminal envelope cannot revive it.
//!
//! Thread-safe via `RwLock<HashMap>`, so the store can sit behind a
//! [`ChannelReceiver`](crate::ChannelReceiver) callback and be queried from
//! elsewhere at the same time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use toolcast_types::{EventPayload, PayloadValue, ToolEventEnvelope, ToolEventType};
use tracing::debug;

use crate::receiver::EventCallback;

/// Lifecycle status of one tool instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Initializing,
    Building,
    Completed,
    Error,
    Cancelled,
}

impl ToolStatus {
    /// Still initializing or building.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initializing | Self::Building)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Building => "building",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a consumer knows about one tool instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolState {
    pub id: String,
    #[serde(rename = "type")]
    pub tool_type: String,
    pub status: ToolStatus,
    pub session_id: String,
    pub maestro_id: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
    /// Percent, always within `0..=100`.
    pub progress: u8,
    pub chunks_received: usize,
    pub raw_chunks: Vec<String>,
    /// Tool-specific content object.
    pub content: Value,
    pub error_message: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for [`ToolStateStore::create`].
#[derive(Debug, Clone, Default)]
pub struct NewToolState {
    pub id: String,
    pub tool_type: String,
    pub session_id: String,
    pub maestro_id: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
}

impl NewToolState {
    pub fn new(id: impl Into<String>, tool_type: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_type: tool_type.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn with_maestro(mut self, maestro_id: impl Into<String>) -> Self {
        self.maestro_id = Some(maestro_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// Partial update for [`ToolStateStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolStateUpdate {
    /// Clamped into `0..=100`.
    pub progress: Option<i64>,
    /// Appended to `raw_chunks`.
    pub chunk: Option<String>,
    /// Shallow-merged into `content`.
    pub content: Option<Map<String, Value>>,
}

impl ToolStateUpdate {
    pub fn progress(progress: i64) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn chunk(chunk: impl Into<String>) -> Self {
        Self {
            chunk: Some(chunk.into()),
            ..Default::default()
        }
    }

    pub fn content(content: Map<String, Value>) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }
}

/// Counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStateStats {
    pub total_tools: usize,
    /// Distinct sessions with at least one tracked tool.
    pub active_sessions: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<ToolStatus, usize>,
}

/// Empty content for the known tool kinds.
fn initial_content(tool_type: &str) -> Value {
    match tool_type {
        "mindmap" => json!({ "centralTopic": "", "nodes": [] }),
        "quiz" => json!({ "questions": [] }),
        "flashcards" => json!({ "cards": [] }),
        "diagram" => json!({ "type": "flowchart", "mermaidCode": "" }),
        _ => json!({}),
    }
}

fn merge_content(content: &mut Value, patch: Map<String, Value>) {
    match content.as_object_mut() {
        Some(obj) => obj.extend(patch),
        None => *content = Value::Object(patch),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct Entry {
    state: ToolState,
    /// Envelope kinds already folded in.
    seen: HashSet<ToolEventType>,
}

impl Entry {
    fn touch(&mut self) {
        self.state.updated_at = now_millis();
    }

    fn apply_update(&mut self, update: ToolStateUpdate) {
        if let Some(progress) = update.progress {
            self.state.progress = progress.clamp(0, 100) as u8;
        }
        if let Some(chunk) = update.chunk {
            self.state.raw_chunks.push(chunk);
            self.state.chunks_received += 1;
        }
        if let Some(content) = update.content {
            merge_content(&mut self.state.content, content);
        }
        self.state.status = ToolStatus::Building;
        self.touch();
    }

    fn finish(&mut self, status: ToolStatus) {
        self.state.status = status;
        self.touch();
    }
}

/// Per-session tool state, keyed by tool instance id.
#[derive(Default)]
pub struct ToolStateStore {
    tools: RwLock<HashMap<String, Entry>>,
}

impl ToolStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a tool. An existing entry with the same id is replaced.
    pub fn create(&self, new: NewToolState) -> ToolState {
        let now = now_millis();
        let state = ToolState {
            content: initial_content(&new.tool_type),
            id: new.id,
            tool_type: new.tool_type,
            status: ToolStatus::Initializing,
            session_id: new.session_id,
            maestro_id: new.maestro_id,
            title: new.title,
            subject: new.subject,
            progress: 0,
            chunks_received: 0,
            raw_chunks: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        debug!(tool_id = %state.id, tool_type = %state.tool_type, "tracking tool state");
        self.tools.write().insert(
            state.id.clone(),
            Entry {
                state: state.clone(),
                seen: HashSet::new(),
            },
        );
        state
    }

    pub fn get(&self, id: &str) -> Option<ToolState> {
        self.tools.read().get(id).map(|e| e.state.clone())
    }

    /// Apply a partial update and move the tool to `building`.
    ///
    /// Returns `None` for an unknown id. A tool that already finished is
    /// returned unchanged.
    pub fn update(&self, id: &str, update: ToolStateUpdate) -> Option<ToolState> {
        let mut tools = self.tools.write();
        let entry = tools.get_mut(id)?;
        if entry.state.status.is_active() {
            entry.apply_update(update);
        } else {
            debug!(tool_id = %id, status = %entry.state.status, "ignoring update for finished tool");
        }
        Some(entry.state.clone())
    }

    /// Mark completed at 100%, replacing content when `content` is given.
    pub fn complete(&self, id: &str, content: Option<Value>) -> Option<ToolState> {
        let mut tools = self.tools.write();
        let entry = tools.get_mut(id)?;
        entry.state.progress = 100;
        if let Some(content) = content {
            entry.state.content = content;
        }
        entry.finish(ToolStatus::Completed);
        Some(entry.state.clone())
    }

    pub fn fail(&self, id: &str, message: impl Into<String>) -> Option<ToolState> {
        let mut tools = self.tools.write();
        let entry = tools.get_mut(id)?;
        entry.state.error_message = Some(message.into());
        entry.finish(ToolStatus::Error);
        Some(entry.state.clone())
    }

    pub fn cancel(&self, id: &str) -> Option<ToolState> {
        let mut tools = self.tools.write();
        let entry = tools.get_mut(id)?;
        entry.finish(ToolStatus::Cancelled);
        Some(entry.state.clone())
    }

    /// Every tool of one session, oldest first.
    pub fn session_states(&self, session_id: &str) -> Vec<ToolState> {
        self.collect(|s| s.session_id == session_id)
    }

    /// Tools of one session that are still initializing or building.
    pub fn active_states(&self, session_id: &str) -> Vec<ToolState> {
        self.collect(|s| s.session_id == session_id && s.status.is_active())
    }

    fn collect(&self, keep: impl Fn(&ToolState) -> bool) -> Vec<ToolState> {
        let mut states: Vec<ToolState> = self
            .tools
            .read()
            .values()
            .map(|e| &e.state)
            .filter(|s| keep(s))
            .cloned()
            .collect();
        states.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        states
    }

    /// Drop finished tools not updated within `max_age`. Active tools are
    /// never removed. Returns how many were dropped.
    pub fn cleanup_old_tools(&self, max_age: Duration) -> usize {
        self.cleanup_at(now_millis(), max_age)
    }

    fn cleanup_at(&self, now: i64, max_age: Duration) -> usize {
        let cutoff = now.saturating_sub(max_age.as_millis() as i64);
        let mut tools = self.tools.write();
        let before = tools.len();
        tools.retain(|_, e| e.state.status.is_active() || e.state.updated_at >= cutoff);
        let removed = before - tools.len();
        if removed > 0 {
            debug!(removed, "cleaned up finished tool states");
        }
        removed
    }

    pub fn clear(&self) {
        self.tools.write().clear();
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    pub fn stats(&self) -> ToolStateStats {
        let tools = self.tools.read();
        let mut stats = ToolStateStats {
            total_tools: tools.len(),
            ..Default::default()
        };
        let mut sessions = HashSet::new();
        for entry in tools.values() {
            let s = &entry.state;
            sessions.insert(s.session_id.as_str());
            *stats.by_type.entry(s.tool_type.clone()).or_default() += 1;
            *stats.by_status.entry(s.status).or_default() += 1;
        }
        stats.active_sessions = sessions.len();
        stats
    }

    /// Fold one received envelope into the store.
    ///
    /// Unknown tools are created on first sight, whatever the envelope
    /// kind, so a COMPLETED that overtakes its EXECUTING still lands. The
    /// first terminal kind (COMPLETED, ERROR, REJECTED) decides the final
    /// status.
    pub fn apply(&self, envelope: &ToolEventEnvelope) -> ToolState {
        let mut tools = self.tools.write();
        let entry = tools.entry(envelope.tool_id.clone()).or_insert_with(|| {
            let now = now_millis();
            let tool_type = envelope.tool_type.clone().unwrap_or_else(|| "unknown".into());
            Entry {
                state: ToolState {
                    id: envelope.tool_id.clone(),
                    content: initial_content(&tool_type),
                    tool_type,
                    status: ToolStatus::Initializing,
                    session_id: envelope.session_id.clone().unwrap_or_default(),
                    maestro_id: envelope.maestro_id.clone(),
                    title: None,
                    subject: None,
                    progress: 0,
                    chunks_received: 0,
                    raw_chunks: Vec::new(),
                    error_message: None,
                    created_at: now,
                    updated_at: now,
                },
                seen: HashSet::new(),
            }
        });

        if !entry.seen.insert(envelope.event_type) {
            debug!(tool_id = %envelope.tool_id, event_type = %envelope.event_type, "duplicate tool event ignored");
            return entry.state.clone();
        }
        if !entry.state.status.is_active() {
            debug!(
                tool_id = %envelope.tool_id,
                event_type = %envelope.event_type,
                status = %entry.state.status,
                "late tool event after terminal status"
            );
            return entry.state.clone();
        }

        match envelope.event_type {
            ToolEventType::Proposed | ToolEventType::Accepted => entry.touch(),
            ToolEventType::Executing => entry.apply_update(update_from(envelope.payload.as_ref())),
            ToolEventType::Completed => {
                if let Some(EventPayload::Fields(fields)) = &envelope.payload {
                    merge_content(&mut entry.state.content, fields_to_map(fields));
                }
                entry.state.progress = 100;
                entry.finish(ToolStatus::Completed);
            }
            ToolEventType::Error | ToolEventType::Rejected => {
                entry.state.error_message = Some(error_message(envelope));
                entry.finish(ToolStatus::Error);
            }
        }
        entry.state.clone()
    }

    /// A receiver callback that folds every delivered envelope into `store`.
    pub fn callback(store: &Arc<Self>) -> EventCallback {
        let store = store.clone();
        Arc::new(move |envelope| {
            store.apply(&envelope);
        })
    }
}

fn update_from(payload: Option<&EventPayload>) -> ToolStateUpdate {
    let mut update = ToolStateUpdate::default();
    let Some(EventPayload::Fields(fields)) = payload else {
        return update;
    };
    if let Some(PayloadValue::Number(n)) = fields.get("progress") {
        update.progress = n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64));
    }
    if let Some(PayloadValue::String(chunk)) = fields.get("chunk") {
        update.chunk = Some(chunk.clone());
    }
    update
}

fn fields_to_map(fields: &BTreeMap<String, PayloadValue>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| {
            let value = match v {
                PayloadValue::Bool(b) => Value::Bool(*b),
                PayloadValue::Number(n) => Value::Number(n.clone()),
                PayloadValue::String(s) => Value::String(s.clone()),
            };
            (k.clone(), value)
        })
        .collect()
}

fn error_message(envelope: &ToolEventEnvelope) -> String {
    let field = |key: &str| {
        envelope
            .payload
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(PayloadValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    field("message")
        .or_else(|| field("code"))
        .unwrap_or_else(|| format!("tool {}", envelope.event_type.as_str().to_ascii_lowercase()))
}
