//! Argument schemas for plugin input validation.
//!
//! A plugin declares its arguments as a JSON Schema object. [`ArgSchema`] is
//! a builder for the common flat case; any hand-written JSON Schema works
//! too. The registry compiles each schema once into an [`ArgValidator`],
//! and validation reports the first problem as a [`ValidationIssue`].
//!
//! ```ignore
//! ArgSchema::new()
//!     .required("topic", FieldKind::string().min_len(3))
//!     .optional("questionCount", FieldKind::integer().range(1, 20))
//! ```

use std::fmt;

use jsonschema::JSONSchema;
use jsonschema::error::ValidationErrorKind;
use serde_json::{Map, Value, json};

/// Type and bounds of one argument field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Boolean,
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    /// Any JSON array.
    Array,
    /// Any JSON value.
    Any,
}

impl FieldKind {
    /// Unbounded string.
    pub fn string() -> Self {
        Self::String {
            min_len: None,
            max_len: None,
        }
    }

    pub fn number() -> Self {
        Self::Number { min: None, max: None }
    }

    pub fn integer() -> Self {
        Self::Integer { min: None, max: None }
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Minimum length in characters. No effect on non-string kinds.
    pub fn min_len(self, n: usize) -> Self {
        match self {
            Self::String { max_len, .. } => Self::String {
                min_len: Some(n),
                max_len,
            },
            other => other,
        }
    }

    /// Maximum length in characters. No effect on non-string kinds.
    pub fn max_len(self, n: usize) -> Self {
        match self {
            Self::String { min_len, .. } => Self::String {
                min_len,
                max_len: Some(n),
            },
            other => other,
        }
    }

    /// Inclusive range for integer kinds. No effect on other kinds.
    pub fn range(self, lo: i64, hi: i64) -> Self {
        match self {
            Self::Integer { .. } => Self::Integer {
                min: Some(lo),
                max: Some(hi),
            },
            other => other,
        }
    }

    /// Inclusive bounds for number kinds. No effect on other kinds.
    pub fn bounds(self, lo: f64, hi: f64) -> Self {
        match self {
            Self::Number { .. } => Self::Number {
                min: Some(lo),
                max: Some(hi),
            },
            other => other,
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            Self::String { min_len, max_len } => {
                let mut s = json!({ "type": "string" });
                if let Some(n) = min_len {
                    s["minLength"] = json!(n);
                }
                if let Some(n) = max_len {
                    s["maxLength"] = json!(n);
                }
                s
            }
            Self::Number { min, max } => with_bounds(json!({ "type": "number" }), *min, *max),
            Self::Integer { min, max } => with_bounds(json!({ "type": "integer" }), *min, *max),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Enum(values) => json!({ "type": "string", "enum": values }),
            Self::Array => json!({ "type": "array" }),
            Self::Any => json!({}),
        }
    }
}

fn with_bounds<T: serde::Serialize>(mut schema: Value, min: Option<T>, max: Option<T>) -> Value {
    if let Some(min) = min {
        schema["minimum"] = json!(min);
    }
    if let Some(max) = max {
        schema["maximum"] = json!(max);
    }
    schema
}

/// One named field of an [`ArgSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: Option<String>,
}

/// Builder for a flat object schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgSchema {
    fields: Vec<FieldSpec>,
    deny_unknown: bool,
}

impl ArgSchema {
    /// Empty schema; additional fields allowed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema that accepts every object.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: FieldKind) -> Self {
        self.push(name, kind, true);
        self
    }

    pub fn optional(mut self, name: &str, kind: FieldKind) -> Self {
        self.push(name, kind, false);
        self
    }

    /// Attach a description to the most recently added field.
    pub fn describe(mut self, description: &str) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.description = Some(description.to_string());
        }
        self
    }

    /// Reject fields that are not declared.
    pub fn deny_unknown(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn push(&mut self, name: &str, kind: FieldKind, required: bool) {
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required,
            description: None,
        });
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut schema = field.kind.json_schema();
            if let Some(desc) = &field.description {
                schema["description"] = json!(desc);
            }
            properties.insert(field.name.clone(), schema);
            if field.required {
                required.push(field.name.clone());
            }
        }

        let mut schema = json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        if self.deny_unknown {
            schema["additionalProperties"] = json!(false);
        }
        schema
    }
}

impl From<ArgSchema> for Value {
    fn from(schema: ArgSchema) -> Self {
        schema.to_json_schema()
    }
}

/// First problem found while validating arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Offending field (empty for whole-object problems).
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// A plugin's argument schema, compiled once.
pub struct ArgValidator {
    schema: Value,
    compiled: JSONSchema,
}

impl ArgValidator {
    /// Compile `schema`, returning the compiler's message on failure.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let compiled = JSONSchema::compile(schema).map_err(|e| e.to_string())?;
        Ok(Self {
            schema: schema.clone(),
            compiled,
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate `args`, returning the first issue reported.
    ///
    /// An explicit `null` counts as absent.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), ValidationIssue> {
        let instance = Value::Object(
            args.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let Err(mut errors) = self.compiled.validate(&instance) else {
            return Ok(());
        };
        let Some(first) = errors.next() else {
            return Ok(());
        };

        let field = match &first.kind {
            ValidationErrorKind::Required { property } => {
                property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string())
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                unexpected.first().cloned().unwrap_or_default()
            }
            _ => first.instance_path.to_string().trim_start_matches('/').to_string(),
        };
        Err(ValidationIssue {
            field,
            message: first.to_string(),
        })
    }
}

impl fmt::Debug for ArgValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgValidator").field("schema", &self.schema).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn quiz_schema() -> ArgSchema {
        ArgSchema::new()
            .required("topic", FieldKind::string().min_len(3).max_len(40))
            .optional("questionCount", FieldKind::integer().range(1, 20))
            .optional("difficulty", FieldKind::one_of(["easy", "medium", "hard"]))
    }

    fn compiled(schema: ArgSchema) -> ArgValidator {
        ArgValidator::compile(&schema.into()).unwrap()
    }

    #[test]
    fn valid_arguments_pass() {
        let v = compiled(quiz_schema());
        assert!(v.validate(&args(json!({ "topic": "frazioni" }))).is_ok());
        assert!(
            v.validate(&args(json!({ "topic": "frazioni", "questionCount": 10, "difficulty": "hard" })))
                .is_ok()
        );
    }

    #[test]
    fn missing_required_field_names_the_field() {
        let issue = compiled(quiz_schema()).validate(&Map::new()).unwrap_err();
        assert_eq!(issue.field, "topic");
        assert!(issue.message.contains("required"), "{issue}");
        assert!(issue.to_string().starts_with("topic: "));
    }

    #[test]
    fn null_counts_as_missing() {
        let v = compiled(quiz_schema());
        let issue = v.validate(&args(json!({ "topic": null }))).unwrap_err();
        assert_eq!(issue.field, "topic");
        assert!(issue.message.contains("required"));
        assert!(v.validate(&args(json!({ "topic": "abc", "difficulty": null }))).is_ok());
    }

    #[test]
    fn string_length_bounds() {
        let v = compiled(quiz_schema());
        let issue = v.validate(&args(json!({ "topic": "ab" }))).unwrap_err();
        assert_eq!(issue.field, "topic");
        assert!(issue.message.contains("shorter than 3"), "{issue}");
        // Lengths are counted in characters, not bytes.
        assert!(v.validate(&args(json!({ "topic": "èèè" }))).is_ok());
    }

    #[test]
    fn only_one_issue_is_reported() {
        let issue = compiled(quiz_schema())
            .validate(&args(json!({ "topic": 5, "questionCount": 99 })))
            .unwrap_err();
        assert!(issue.field == "topic" || issue.field == "questionCount", "{issue}");
        assert!(!issue.message.contains('\n'));
    }

    #[test]
    fn integer_and_enum_checks() {
        let v = compiled(quiz_schema());
        let issue = v
            .validate(&args(json!({ "topic": "abc", "questionCount": 2.5 })))
            .unwrap_err();
        assert_eq!(issue.field, "questionCount");
        assert!(issue.message.contains("integer"), "{issue}");

        let issue = v
            .validate(&args(json!({ "topic": "abc", "questionCount": 0 })))
            .unwrap_err();
        assert_eq!(issue.field, "questionCount");
        assert!(issue.message.contains("minimum"), "{issue}");

        let issue = v
            .validate(&args(json!({ "topic": "abc", "difficulty": "brutal" })))
            .unwrap_err();
        assert_eq!(issue.field, "difficulty");
    }

    #[test]
    fn number_boolean_array() {
        let v = compiled(
            ArgSchema::new()
                .required("ratio", FieldKind::number().bounds(0.0, 1.0))
                .required("spoken", FieldKind::Boolean)
                .required("items", FieldKind::Array),
        );
        assert!(v.validate(&args(json!({ "ratio": 0.5, "spoken": true, "items": [] }))).is_ok());
        assert!(v.validate(&args(json!({ "ratio": 1.5, "spoken": true, "items": [] }))).is_err());
        assert!(v.validate(&args(json!({ "ratio": 0.5, "spoken": "yes", "items": [] }))).is_err());
        assert!(v.validate(&args(json!({ "ratio": 0.5, "spoken": true, "items": {} }))).is_err());
    }

    #[test]
    fn unknown_fields() {
        let extra = args(json!({ "topic": "abc", "colour": "red" }));
        assert!(compiled(quiz_schema()).validate(&extra).is_ok());
        let issue = compiled(quiz_schema().deny_unknown()).validate(&extra).unwrap_err();
        assert_eq!(issue.field, "colour");
    }

    #[test]
    fn any_accepts_everything() {
        let v = compiled(ArgSchema::any());
        assert!(v.validate(&args(json!({ "x": [1, { "y": 2 }] }))).is_ok());
        assert!(v.validate(&Map::new()).is_ok());
    }

    #[test]
    fn hand_written_schema_nested_path() {
        let v = ArgValidator::compile(&json!({
            "type": "object",
            "properties": {
                "cards": { "type": "array", "items": { "type": "string" } }
            }
        }))
        .unwrap();
        let issue = v.validate(&args(json!({ "cards": ["uno", 2] }))).unwrap_err();
        assert_eq!(issue.field, "cards/1");
    }

    #[test]
    fn malformed_schema_does_not_compile() {
        let err = ArgValidator::compile(&json!({ "type": "object", "properties": { "topic": { "type": "strng" } } }))
            .unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn json_schema_rendering() {
        let schema = quiz_schema().describe("Difficulty level").deny_unknown().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["topic"]));
        assert_eq!(schema["properties"]["topic"]["minLength"], 3);
        assert_eq!(schema["properties"]["questionCount"]["maximum"], 20);
        assert_eq!(schema["properties"]["difficulty"]["enum"], json!(["easy", "medium", "hard"]));
        assert_eq!(schema["properties"]["difficulty"]["description"], "Difficulty level");
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn redeclaring_a_field_replaces_it() {
        let schema = ArgSchema::new()
            .required("topic", FieldKind::string())
            .optional("topic", FieldKind::Any);
        assert_eq!(schema.fields().len(), 1);
        assert!(!schema.fields()[0].required);
    }
}
