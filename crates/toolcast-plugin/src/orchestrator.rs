//! Tool orchestrator.
//!
//! Resolves a tool id against the registry and runs it under the plugin
//! contract. Checks run in a fixed order and stop at the first failure:
//!
//! 1. registry lookup (`PLUGIN_NOT_FOUND`)
//! 2. argument schema (`VALIDATION_FAILED`)
//! 3. prerequisites, user and session first (`PREREQUISITES_NOT_MET`)
//! 4. permissions (`PERMISSION_DENIED`)
//! 5. recursion guard (`PREREQUISITES_NOT_MET`)
//!
//! The handler then runs with a time budget. Errors, panics, and timeouts
//! all come back as a failed [`ToolResult`]; nothing is thrown to the caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::{Map, Value};
use toolcast_types::config::OrchestratorConfig;
use toolcast_types::{ErrorCode, ToolResult};
use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::plugin::{Permission, Prerequisite, ToolCategory, ToolMetadata, ToolPlugin};
use crate::registry::ToolRegistry;

const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// A call that passed every pre-execution check.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    plugin: Arc<ToolPlugin>,
    args: Map<String, Value>,
}

impl PreparedCall {
    pub fn plugin(&self) -> &ToolPlugin {
        &self.plugin
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }
}

/// Runs registered tools under the plugin contract.
pub struct ToolOrchestrator {
    registry: Arc<ToolRegistry>,
    handler_timeout: Duration,
}

impl ToolOrchestrator {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    pub fn from_config(registry: Arc<ToolRegistry>, config: &OrchestratorConfig) -> Self {
        Self::new(registry).with_timeout(Duration::from_millis(config.handler_timeout_ms))
    }

    /// Override the per-invocation handler budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Resolve and check a call without running it.
    pub fn prepare(
        &self,
        tool_id: &str,
        args: Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<PreparedCall, ToolResult> {
        let Some(plugin) = self.registry.get(tool_id) else {
            return Err(reject(ErrorCode::PluginNotFound, format!("Tool '{tool_id}' not found")));
        };

        if let Some(validator) = self.registry.validator(tool_id)
            && let Err(issue) = validator.validate(&args)
        {
            return Err(reject(
                ErrorCode::ValidationFailed,
                format!("Invalid arguments for tool '{tool_id}': {issue}"),
            ));
        }

        if let Some(unmet) = first_unmet_prerequisite(&plugin, ctx) {
            return Err(reject(
                ErrorCode::PrerequisitesNotMet,
                format!("Prerequisites not met for tool '{tool_id}': {}", unmet.describe()),
            ));
        }

        let missing = ctx.missing_permissions(&plugin.permissions);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(Permission::as_str).collect();
            return Err(reject(
                ErrorCode::PermissionDenied,
                format!("Insufficient permissions for tool '{tool_id}': missing {}", names.join(", ")),
            ));
        }

        if ctx.active_tools().contains(tool_id) {
            return Err(already_active(tool_id));
        }

        Ok(PreparedCall { plugin, args })
    }

    /// Run a prepared call's handler under the time budget.
    pub async fn run(&self, call: PreparedCall, ctx: &ExecutionContext) -> ToolResult {
        let PreparedCall { plugin, args } = call;
        let tool_id = plugin.id.as_str();

        // Re-checked under the stack lock: another invocation may have
        // entered since `prepare`.
        let Some(_guard) = ctx.active_tools().try_enter(tool_id) else {
            return already_active(tool_id);
        };

        debug!(%tool_id, timeout_ms = self.handler_timeout.as_millis() as u64, "invoking handler");
        let started = Instant::now();
        let invocation = AssertUnwindSafe(plugin.handler.handle(args, ctx.clone())).catch_unwind();
        let outcome = tokio::time::timeout(self.handler_timeout, invocation).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(Ok(result))) => {
                info!(%tool_id, success = result.success, elapsed_ms, "tool finished");
                result
            }
            Ok(Ok(Err(e))) => {
                warn!(%tool_id, error = %e, elapsed_ms, "tool handler failed");
                ToolResult::failure(
                    ErrorCode::ExecutionFailed,
                    format!("Tool execution failed for '{tool_id}': {e}"),
                )
            }
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                warn!(%tool_id, %reason, elapsed_ms, "tool handler panicked");
                ToolResult::failure(
                    ErrorCode::ExecutionFailed,
                    format!("Tool execution failed for '{tool_id}': {reason}"),
                )
            }
            Err(_) => {
                let budget_ms = self.handler_timeout.as_millis() as u64;
                warn!(%tool_id, budget_ms, "tool handler timed out");
                ToolResult::failure(
                    ErrorCode::Timeout,
                    format!("Tool '{tool_id}' timed out after {budget_ms} ms"),
                )
            }
        }
    }

    /// Check and run a tool. Always returns a result.
    pub async fn execute(&self, tool_id: &str, args: Map<String, Value>, ctx: &ExecutionContext) -> ToolResult {
        match self.prepare(tool_id, args, ctx) {
            Ok(call) => self.run(call, ctx).await,
            Err(rejection) => {
                info!(%tool_id, error = rejection.error.as_deref().unwrap_or(""), "tool call rejected");
                rejection
            }
        }
    }

    /// Whether the implicit and declared prerequisites all hold.
    pub fn validate_prerequisites(&self, plugin: &ToolPlugin, ctx: &ExecutionContext) -> bool {
        first_unmet_prerequisite(plugin, ctx).is_none()
    }

    pub fn tool_metadata(&self, tool_id: &str) -> Option<ToolMetadata> {
        self.registry.get(tool_id).map(|p| p.metadata())
    }

    pub fn tools_by_category(&self, category: ToolCategory) -> Vec<ToolMetadata> {
        self.registry
            .by_category(category)
            .iter()
            .map(|p| p.metadata())
            .collect()
    }
}

static IMPLICIT_PREREQUISITES: [Prerequisite; 2] = [Prerequisite::UserIdentified, Prerequisite::SessionActive];

fn first_unmet_prerequisite<'a>(plugin: &'a ToolPlugin, ctx: &ExecutionContext) -> Option<&'a Prerequisite> {
    IMPLICIT_PREREQUISITES
        .iter()
        .chain(plugin.prerequisites.iter())
        .find(|p| !p.is_met(ctx))
}

fn reject(code: ErrorCode, message: String) -> ToolResult {
    ToolResult::failure(code, message)
}

fn already_active(tool_id: &str) -> ToolResult {
    reject(
        ErrorCode::PrerequisitesNotMet,
        format!("Tool '{tool_id}' is already active in this context"),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
