//! Plugin registry.
//!
//! Built once at startup, then shared read-only as `Arc<ToolRegistry>`
//! with the orchestrator, the trigger detector, and the feedback injector.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::plugin::{ToolCategory, ToolPlugin, VoiceTemplate};
use crate::schema::ArgValidator;

/// Registry of tool plugins, indexed by id.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    plugins: HashMap<String, Arc<ToolPlugin>>,
    validators: HashMap<String, ArgValidator>,
    /// Ids in first-registration order.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin after checking its definition and compiling its
    /// argument schema.
    ///
    /// Registering an id twice replaces the earlier definition and keeps
    /// its original position in registration order.
    pub fn register(&mut self, plugin: ToolPlugin) -> Result<(), PluginError> {
        validate_definition(&plugin)?;
        let validator = ArgValidator::compile(&plugin.schema).map_err(|reason| PluginError::InvalidDefinition {
            id: plugin.id.clone(),
            reason: format!("invalid argument schema: {reason}"),
        })?;

        let id = plugin.id.clone();
        self.validators.insert(id.clone(), validator);
        if self.plugins.insert(id.clone(), Arc::new(plugin)).is_some() {
            warn!(tool_id = %id, "replacing already registered plugin");
        } else {
            debug!(tool_id = %id, "registering plugin");
            self.order.push(id);
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<ToolPlugin>> {
        self.plugins.get(id).cloned()
    }

    /// Compiled argument schema for `id`.
    pub fn validator(&self, id: &str) -> Option<&ArgValidator> {
        self.validators.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// All plugin ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Plugins in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolPlugin>> {
        self.order.iter().filter_map(|id| self.plugins.get(id))
    }

    /// Plugins of one category, in registration order.
    pub fn by_category(&self, category: ToolCategory) -> Vec<Arc<ToolPlugin>> {
        self.iter().filter(|p| p.category == category).cloned().collect()
    }

    /// Function-calling schema entries, sorted by id.
    pub fn schemas(&self) -> Vec<Value> {
        self.list()
            .iter()
            .filter_map(|id| self.plugins.get(id))
            .map(|p| p.schema_entry())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

fn validate_definition(plugin: &ToolPlugin) -> Result<(), PluginError> {
    let invalid = |reason: &str| PluginError::InvalidDefinition {
        id: plugin.id.clone(),
        reason: reason.to_string(),
    };

    if plugin.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if plugin.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if plugin.triggers.is_empty() {
        return Err(invalid("at least one trigger is required"));
    }
    if plugin.triggers.iter().any(|t| t.trim().is_empty()) {
        return Err(invalid("triggers must not be blank"));
    }
    let blank = |t: &Option<VoiceTemplate>| t.as_ref().is_some_and(|t| t.template.trim().is_empty());
    if blank(&plugin.voice_prompt) || blank(&plugin.voice_feedback) {
        return Err(invalid("voice templates must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::handler_fn;
    use crate::schema::{ArgSchema, FieldKind};
    use toolcast_types::ToolResult;

    fn plugin(id: &str, category: ToolCategory) -> ToolPlugin {
        ToolPlugin::new(id, format!("{id} tool"), category, handler_fn(|_, _| async { Ok(ToolResult::done()) }))
            .with_triggers([id.replace('_', " ")])
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(plugin("quiz", ToolCategory::Assessment)).unwrap();
        registry.register(plugin("mindmap", ToolCategory::Creation)).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("quiz"));
        assert!(!registry.contains("summary"));
        assert_eq!(registry.get("mindmap").unwrap().name, "mindmap tool");
        assert_eq!(registry.list(), vec!["mindmap", "quiz"]);
    }

    #[test]
    fn by_category_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(plugin("summary", ToolCategory::Creation)).unwrap();
        registry.register(plugin("quiz", ToolCategory::Assessment)).unwrap();
        registry.register(plugin("mindmap", ToolCategory::Creation)).unwrap();

        let ids: Vec<String> = registry
            .by_category(ToolCategory::Creation)
            .iter()
            .map(|p| p.id.clone())
            .collect();
        assert_eq!(ids, vec!["summary", "mindmap"]);
        assert!(registry.by_category(ToolCategory::Search).is_empty());
    }

    #[test]
    fn duplicate_id_replaces() {
        let mut registry = ToolRegistry::new();
        registry.register(plugin("quiz", ToolCategory::Assessment)).unwrap();
        registry
            .register(plugin("quiz", ToolCategory::Educational).with_triggers(["fammi un quiz"]))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().count(), 1);
        assert_eq!(registry.get("quiz").unwrap().triggers, vec!["fammi un quiz"]);
    }

    #[test]
    fn rejects_bad_definitions() {
        let mut registry = ToolRegistry::new();
        let cases = [
            plugin("", ToolCategory::Search),
            ToolPlugin {
                name: " ".into(),
                ..plugin("quiz", ToolCategory::Search)
            },
            plugin("quiz", ToolCategory::Search).with_triggers(Vec::<String>::new()),
            plugin("quiz", ToolCategory::Search).with_triggers(["  "]),
            plugin("quiz", ToolCategory::Search).with_voice_prompt(""),
            plugin("quiz", ToolCategory::Search).with_voice_feedback(VoiceTemplate::new(" ").with_fallback("ok")),
        ];
        for bad in cases {
            let err = registry.register(bad).unwrap_err();
            assert!(matches!(err, PluginError::InvalidDefinition { .. }));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn schema_compiled_at_registration() {
        let mut registry = ToolRegistry::new();
        let quiz = plugin("quiz", ToolCategory::Assessment)
            .with_schema(ArgSchema::new().required("topic", FieldKind::string()));
        registry.register(quiz).unwrap();

        let validator = registry.validator("quiz").unwrap();
        assert_eq!(validator.schema()["required"], serde_json::json!(["topic"]));
        assert!(validator.validate(&serde_json::Map::new()).is_err());
        assert!(registry.validator("mindmap").is_none());
    }

    #[test]
    fn rejects_uncompilable_schema() {
        let mut registry = ToolRegistry::new();
        let bad = plugin("quiz", ToolCategory::Assessment).with_schema(serde_json::json!({ "type": "objekt" }));
        let err = registry.register(bad).unwrap_err();
        assert!(err.to_string().contains("invalid argument schema"));
        assert!(registry.is_empty());
    }

    #[test]
    fn schemas_sorted_by_id() {
        let mut registry = ToolRegistry::new();
        registry.register(plugin("quiz", ToolCategory::Assessment)).unwrap();
        registry.register(plugin("flashcards", ToolCategory::Educational)).unwrap();
        let names: Vec<Value> = registry
            .schemas()
            .into_iter()
            .map(|s| s["function"]["name"].clone())
            .collect();
        assert_eq!(names, vec!["flashcards", "quiz"]);
    }
}
