//! Per-invocation execution context.
//!
//! [`ExecutionContext`] is cheap to clone. Clones share one [`ActiveTools`]
//! stack, which is how the recursion guard sees through nested calls made
//! from inside a handler.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::Permission;

/// One prior message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Stack of tool ids currently executing, shared by all clones of a context.
#[derive(Debug, Clone, Default)]
pub struct ActiveTools(Arc<Mutex<Vec<String>>>);

impl ActiveTools {
    pub fn contains(&self, tool_id: &str) -> bool {
        self.0.lock().iter().any(|t| t == tool_id)
    }

    /// Copy of the stack, outermost first.
    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Push `tool_id` unless it is already on the stack.
    ///
    /// The check and the push happen under one lock, so two concurrent
    /// invocations of the same tool cannot both enter.
    pub fn try_enter(&self, tool_id: &str) -> Option<ActiveToolGuard> {
        let mut stack = self.0.lock();
        if stack.iter().any(|t| t == tool_id) {
            return None;
        }
        stack.push(tool_id.to_string());
        Some(ActiveToolGuard {
            tools: self.clone(),
            tool_id: tool_id.to_string(),
        })
    }
}

/// Pops its tool id off the stack when dropped.
#[derive(Debug)]
pub struct ActiveToolGuard {
    tools: ActiveTools,
    tool_id: String,
}

impl Drop for ActiveToolGuard {
    fn drop(&mut self) {
        let mut stack = self.tools.0.lock();
        if let Some(pos) = stack.iter().rposition(|t| *t == self.tool_id) {
            stack.remove(pos);
        }
    }
}

/// Everything a tool invocation may consult. Not persisted.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub user_id: String,
    pub session_id: String,
    pub maestro_id: Option<String>,
    pub conversation_id: Option<String>,
    pub conversation_history: Vec<ConversationTurn>,
    pub user_profile: Option<Value>,
    pub granted_permissions: HashSet<Permission>,
    /// Current lesson topic, used by voice proposals.
    pub topic: Option<String>,
    /// Current school subject, used by voice proposals.
    pub subject: Option<String>,
    active_tools: ActiveTools,
}

impl ExecutionContext {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn with_maestro(mut self, maestro_id: impl Into<String>) -> Self {
        self.maestro_id = Some(maestro_id.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_profile(mut self, profile: Value) -> Self {
        self.user_profile = Some(profile);
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.granted_permissions.extend(permissions);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Seed the active stack with tools already running elsewhere.
    pub fn with_active_tools<I, S>(self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_tools.0.lock().extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn active_tools(&self) -> &ActiveTools {
        &self.active_tools
    }

    /// Whether every permission in `required` has been granted.
    pub fn has_permissions(&self, required: &[Permission]) -> bool {
        required.iter().all(|p| self.granted_permissions.contains(p))
    }

    /// Required permissions that have not been granted, in declaration order.
    pub fn missing_permissions(&self, required: &[Permission]) -> Vec<Permission> {
        required
            .iter()
            .filter(|p| !self.granted_permissions.contains(p))
            .copied()
            .collect()
    }
}
