//! Template-driven voice lines for proposals and confirmations.
//!
//! Templates use `{name}` placeholders. Only variables the injector knows
//! about are substituted; anything else is left in the sentence verbatim.
//!
//! - Proposal variables: `toolName`, `topic`, `subject`
//! - Confirmation variables: `toolName`, `itemCount`, and every top-level
//!   scalar field of the result's `data`
//!
//! When a template lists `requiresContext` and one of those variables was
//! not supplied (built-in defaults do not count), its fallback is spoken.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde_json::Value;
use toolcast_types::{Locale, ToolResult};

use crate::context::ExecutionContext;
use crate::feedback::FeedbackInjector;
use crate::plugin::{ToolPlugin, VoiceTemplate};
use crate::registry::ToolRegistry;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

const DEFAULT_TOPIC: &str = "this topic";
const DEFAULT_SUBJECT: &str = "this subject";

/// Replace known `{name}` placeholders; unknown ones are preserved.
pub fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render `template`, or its fallback if a required variable was not provided.
fn render(template: &VoiceTemplate, provided: &HashMap<&str, String>, defaults: &[(&'static str, String)]) -> String {
    let missing = template
        .requires_context
        .iter()
        .any(|name| !provided.contains_key(name.as_str()));
    if missing && let Some(fallback) = &template.fallback {
        return fallback.clone();
    }

    let mut vars = provided.clone();
    for (name, value) in defaults {
        vars.entry(*name).or_insert_with(|| value.clone());
    }
    substitute(&template.template, &vars)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Fills plugin voice templates from registry metadata and runtime context.
pub struct VoiceFeedbackInjector {
    registry: Arc<ToolRegistry>,
    locale: Locale,
}

impl VoiceFeedbackInjector {
    pub fn new(registry: Arc<ToolRegistry>, locale: Locale) -> Self {
        Self { registry, locale }
    }

    /// The line offering to run `tool_id`.
    pub fn inject_proposal(&self, tool_id: &str, ctx: &ExecutionContext) -> String {
        let Some(plugin) = self.registry.get(tool_id) else {
            return format!("Tool {tool_id} is not available.");
        };

        let mut provided = HashMap::from([("toolName", plugin.name.clone())]);
        if let Some(topic) = &ctx.topic {
            provided.insert("topic", topic.clone());
        }
        if let Some(subject) = &ctx.subject {
            provided.insert("subject", subject.clone());
        }
        let defaults = [
            ("topic", DEFAULT_TOPIC.to_string()),
            ("subject", DEFAULT_SUBJECT.to_string()),
        ];

        match &plugin.voice_prompt {
            Some(template) => render(template, &provided, &defaults),
            None => self.generic_proposal(&plugin),
        }
    }

    /// Ids of tools whose triggers overlap any keyword or the topic.
    ///
    /// Overlap is case-insensitive containment in either direction.
    pub fn contextual_triggers(&self, keywords: &[&str], topic: Option<&str>) -> Vec<String> {
        let terms: Vec<String> = keywords
            .iter()
            .copied()
            .chain(topic)
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        self.registry
            .iter()
            .filter(|plugin| {
                plugin.triggers.iter().any(|trigger| {
                    let trigger = trigger.to_lowercase();
                    terms
                        .iter()
                        .any(|term| trigger.contains(term.as_str()) || term.contains(trigger.as_str()))
                })
            })
            .map(|plugin| plugin.id.clone())
            .collect()
    }

    fn generic_proposal(&self, plugin: &ToolPlugin) -> String {
        match self.locale {
            Locale::It => format!("Vuoi usare {}?", plugin.name),
            Locale::En => format!("Would you like to use {}?", plugin.name),
        }
    }

    fn generic_confirmation(&self, plugin: &ToolPlugin) -> String {
        match self.locale {
            Locale::It => format!("Ho completato {}.", plugin.name),
            Locale::En => format!("{} is done.", plugin.name),
        }
    }
}

impl FeedbackInjector for VoiceFeedbackInjector {
    fn inject_confirmation(&self, tool_id: &str, result: &ToolResult) -> String {
        let Some(plugin) = self.registry.get(tool_id) else {
            return format!("Tool {tool_id} execution completed.");
        };
        let Some(template) = &plugin.voice_feedback else {
            return self.generic_confirmation(&plugin);
        };

        let mut provided: HashMap<&str, String> = result
            .data
            .as_ref()
            .and_then(Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.as_str(), s)))
                    .collect()
            })
            .unwrap_or_default();
        provided.insert("toolName", plugin.name.clone());

        render(template, &provided, &[("itemCount", "0".to_string())])
    }
}
