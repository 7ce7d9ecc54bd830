//! The tool plugin contract.
//!
//! A [`ToolPlugin`] is an immutable definition: identity, argument schema,
//! required permissions, prerequisites, voice triggers, templated voice
//! lines, and the [`ToolHandler`] that does the work.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use toolcast_types::ToolResult;

use crate::context::ExecutionContext;
use crate::error::PluginError;
use crate::schema::ArgSchema;

// ---------------------------------------------------------------------------
// Permissions and categories
// ---------------------------------------------------------------------------

/// Capability a plugin needs from its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadConversation,
    ReadProfile,
    WriteContent,
    VoiceOutput,
    FileAccess,
    ExternalApi,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadConversation => "read_conversation",
            Self::ReadProfile => "read_profile",
            Self::WriteContent => "write_content",
            Self::VoiceOutput => "voice_output",
            Self::FileAccess => "file_access",
            Self::ExternalApi => "external_api",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping used for listing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Educational,
    Creation,
    Assessment,
    Search,
    Navigation,
    Accessibility,
}

// ---------------------------------------------------------------------------
// Prerequisites
// ---------------------------------------------------------------------------

/// Predicate used by [`Prerequisite::Custom`].
pub type PrerequisiteCheck = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// A named condition that must hold before a handler may run.
#[derive(Clone)]
pub enum Prerequisite {
    /// `userId` is non-empty.
    UserIdentified,
    /// `sessionId` is non-empty.
    SessionActive,
    /// The named tool is not currently executing (conflicting tools).
    ToolInactive(String),
    /// The conversation history is non-empty.
    ConversationStarted,
    /// A user profile is loaded.
    ProfileLoaded,
    /// Caller-defined condition.
    Custom { name: String, check: PrerequisiteCheck },
}

impl Prerequisite {
    /// Build a [`Prerequisite::Custom`].
    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Evaluate against a context.
    pub fn is_met(&self, ctx: &ExecutionContext) -> bool {
        match self {
            Self::UserIdentified => !ctx.user_id.is_empty(),
            Self::SessionActive => !ctx.session_id.is_empty(),
            Self::ToolInactive(tool_id) => !ctx.active_tools().contains(tool_id),
            Self::ConversationStarted => !ctx.conversation_history.is_empty(),
            Self::ProfileLoaded => ctx.user_profile.is_some(),
            Self::Custom { check, .. } => check(ctx),
        }
    }

    /// Short label for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::UserIdentified => "user identified".into(),
            Self::SessionActive => "session active".into(),
            Self::ToolInactive(id) => format!("tool '{id}' inactive"),
            Self::ConversationStarted => "conversation started".into(),
            Self::ProfileLoaded => "profile loaded".into(),
            Self::Custom { name, .. } => name.clone(),
        }
    }
}

impl fmt::Debug for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserIdentified => f.write_str("UserIdentified"),
            Self::SessionActive => f.write_str("SessionActive"),
            Self::ToolInactive(id) => f.debug_tuple("ToolInactive").field(id).finish(),
            Self::ConversationStarted => f.write_str("ConversationStarted"),
            Self::ProfileLoaded => f.write_str("ProfileLoaded"),
            Self::Custom { name, .. } => f
                .debug_struct("Custom")
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}

// ---------------------------------------------------------------------------
// Voice templates
// ---------------------------------------------------------------------------

/// A spoken line with `{variable}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceTemplate {
    pub template: String,

    /// Variables that must be available, otherwise `fallback` is spoken.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_context: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl VoiceTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            requires_context: Vec::new(),
            fallback: None,
        }
    }

    pub fn requires<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires_context = vars.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

impl From<&str> for VoiceTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// The work a plugin performs.
///
/// Receives the validated arguments and a clone of the caller's context.
/// The clone shares the active-tool stack, so a handler that resolves tools
/// itself is still subject to the recursion guard.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(
        &self,
        args: Map<String, Value>,
        ctx: ExecutionContext,
    ) -> Result<ToolResult, PluginError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolResult, PluginError>> + Send + 'static,
{
    async fn handle(
        &self,
        args: Map<String, Value>,
        ctx: ExecutionContext,
    ) -> Result<ToolResult, PluginError> {
        (self.0)(args, ctx).await
    }
}

/// Wrap an async closure as a [`ToolHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Map<String, Value>, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult, PluginError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

// ---------------------------------------------------------------------------
// ToolPlugin
// ---------------------------------------------------------------------------

/// Registry entry describing one tool.
#[derive(Clone)]
pub struct ToolPlugin {
    pub id: String,
    pub name: String,
    pub category: ToolCategory,
    /// JSON Schema for the handler's arguments.
    pub schema: Value,
    pub handler: Arc<dyn ToolHandler>,
    pub permissions: Vec<Permission>,
    /// Checked in order after the implicit user and session checks.
    pub prerequisites: Vec<Prerequisite>,
    /// Phrases that activate the tool by voice.
    pub triggers: Vec<String>,
    pub voice_prompt: Option<VoiceTemplate>,
    pub voice_feedback: Option<VoiceTemplate>,
}

impl ToolPlugin {
    /// Minimal plugin: no schema constraints, permissions, or voice lines.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: ToolCategory,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            schema: ArgSchema::any().into(),
            handler,
            permissions: Vec::new(),
            prerequisites: Vec::new(),
            triggers: Vec::new(),
            voice_prompt: None,
            voice_feedback: None,
        }
    }

    /// Accepts an [`ArgSchema`] or a hand-written JSON Schema value.
    pub fn with_schema(mut self, schema: impl Into<Value>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    pub fn with_prerequisites(mut self, prerequisites: impl IntoIterator<Item = Prerequisite>) -> Self {
        self.prerequisites = prerequisites.into_iter().collect();
        self
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_voice_prompt(mut self, prompt: impl Into<VoiceTemplate>) -> Self {
        self.voice_prompt = Some(prompt.into());
        self
    }

    pub fn with_voice_feedback(mut self, feedback: impl Into<VoiceTemplate>) -> Self {
        self.voice_feedback = Some(feedback.into());
        self
    }

    /// Serializable summary for listings.
    pub fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category,
            permissions: self.permissions.clone(),
            prerequisites: self.prerequisites.iter().map(Prerequisite::describe).collect(),
            triggers: self.triggers.clone(),
            voice_prompt: self.voice_prompt.clone(),
            voice_feedback: self.voice_feedback.clone(),
        }
    }

    /// Function-calling style schema entry.
    pub fn schema_entry(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.id,
                "description": self.name,
                "parameters": self.schema,
            }
        })
    }
}

impl fmt::Debug for ToolPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolPlugin")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("permissions", &self.permissions)
            .field("prerequisites", &self.prerequisites)
            .field("triggers", &self.triggers)
            .finish_non_exhaustive()
    }
}

/// Everything about a plugin except its handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    pub id: String,
    pub name: String,
    pub category: ToolCategory,
    pub permissions: Vec<Permission>,
    pub prerequisites: Vec<String>,
    pub triggers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_prompt: Option<VoiceTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_feedback: Option<VoiceTemplate>,
}
