//! Tool execution results and the closed error-code taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Structured reason a tool invocation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No plugin is registered under the requested id.
    PluginNotFound,
    /// The caller-supplied arguments failed schema validation.
    ValidationFailed,
    /// A prerequisite did not hold.
    PrerequisitesNotMet,
    /// The caller lacks a required permission.
    PermissionDenied,
    /// The handler failed or panicked.
    ExecutionFailed,
    /// The handler exceeded its time budget.
    Timeout,
    /// Anything unrecognized.
    Unknown,
}

impl ErrorCode {
    /// Every code, in taxonomy order.
    pub const ALL: [ErrorCode; 7] = [
        Self::PluginNotFound,
        Self::ValidationFailed,
        Self::PrerequisitesNotMet,
        Self::PermissionDenied,
        Self::ExecutionFailed,
        Self::Timeout,
        Self::Unknown,
    ];

    /// Wire name (e.g. `"PLUGIN_NOT_FOUND"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PluginNotFound => "PLUGIN_NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::PrerequisitesNotMet => "PREREQUISITES_NOT_MET",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Exact wire-name lookup.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == name)
    }

    /// Lenient lookup: anything outside the taxonomy becomes [`ErrorCode::Unknown`].
    pub fn from_code_str(name: &str) -> Self {
        Self::parse(name).unwrap_or(Self::Unknown)
    }

    /// First code whose name appears in `message`, ignoring case.
    fn find_in(message: &str) -> Option<Self> {
        let upper = message.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|code| upper.contains(code.as_str()))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one plugin handler invocation.
///
/// `data` is opaque to the core except for the optional nested
/// `data.error.code` / `data.error.message` pair written by
/// [`ToolResult::failure`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool succeeded.
    pub success: bool,

    /// Tool-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Successful result carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Successful result with no payload.
    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Failed result with a structured code and message.
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            data: Some(json!({ "error": { "code": code.as_str(), "message": message } })),
            error: Some(message),
        }
    }

    /// Failed result with only a free-form message, as older handlers return.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Resolve the error code of this result.
    ///
    /// Checks `data.error.code` first, then looks for a code name inside
    /// `error`, and otherwise settles on [`ErrorCode::Unknown`]. Never fails.
    pub fn error_code(&self) -> ErrorCode {
        let structured = self
            .data
            .as_ref()
            .and_then(|d| d.get("error"))
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .and_then(ErrorCode::parse);

        structured
            .or_else(|| self.error.as_deref().and_then(ErrorCode::find_in))
            .unwrap_or(ErrorCode::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_carries_structured_code() {
        let result = ToolResult::failure(ErrorCode::Timeout, "Tool 'quiz' timed out");
        assert!(!result.success);
        assert_eq!(result.error_code(), ErrorCode::Timeout);
        assert_eq!(result.data.as_ref().unwrap()["error"]["code"], "TIMEOUT");
        assert_eq!(result.error.as_deref(), Some("Tool 'quiz' timed out"));
    }

    #[test]
    fn structured_code_wins_over_message() {
        let result = ToolResult {
            success: false,
            data: Some(json!({ "error": { "code": "PERMISSION_DENIED" } })),
            error: Some("TIMEOUT while waiting".into()),
        };
        assert_eq!(result.error_code(), ErrorCode::PermissionDenied);
    }

    #[test]
    fn code_found_in_message_ignoring_case() {
        let result = ToolResult::failed("upstream said: validation_failed on field x");
        assert_eq!(result.error_code(), ErrorCode::ValidationFailed);
    }

    #[test]
    fn unrecognized_structured_code_falls_through_to_message() {
        let result = ToolResult {
            success: false,
            data: Some(json!({ "error": { "code": "BOGUS" } })),
            error: Some("plugin_not_found".into()),
        };
        assert_eq!(result.error_code(), ErrorCode::PluginNotFound);
    }

    #[test]
    fn garbage_shapes_degrade_to_unknown() {
        let cases = [
            ToolResult::failed("something broke"),
            ToolResult::default(),
            ToolResult {
                success: false,
                data: Some(json!({ "error": "flat string" })),
                error: None,
            },
            ToolResult {
                success: false,
                data: Some(json!({ "error": { "code": 42 } })),
                error: None,
            },
            ToolResult {
                success: false,
                data: Some(json!([1, 2, 3])),
                error: None,
            },
        ];
        for result in cases {
            assert_eq!(result.error_code(), ErrorCode::Unknown, "{result:?}");
        }
    }

    #[test]
    fn lenient_lookup() {
        assert_eq!(ErrorCode::from_code_str("TIMEOUT"), ErrorCode::Timeout);
        assert_eq!(ErrorCode::from_code_str("timeout"), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from_code_str("§§§"), ErrorCode::Unknown);
    }

    #[test]
    fn serde_names_match_as_str() {
        for code in ErrorCode::ALL {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, code.as_str());
        }
    }

    #[test]
    fn ok_result_serializes_without_error() {
        let json = serde_json::to_value(ToolResult::ok(json!({ "itemCount": 3 }))).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
    }
}
