// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Mapping between server-declared JSON Schemas and typed command parameters.
//!
//! Each declared schema property becomes one [`ParameterSpec`] with a
//! semantic type, a Title Case label, required-ness and declared constraints.
//! The inverse direction turns raw supplied values into structured call
//! arguments and raw call results into structured output.

use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::types::{ToolCallResult, ToolContent, ToolInfo};

/// Semantic parameter type.
///
/// Unrecognized or absent schema types map to `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Free-form string.
    String,
    /// Integer or float.
    Number,
    /// Boolean flag.
    Boolean,
    /// List of values.
    Array,
}

impl ParameterKind {
    fn from_schema_type(schema_type: Option<&str>) -> Self {
        match schema_type {
            Some("number") | Some("integer") => Self::Number,
            Some("boolean") => Self::Boolean,
            Some("array") => Self::Array,
            _ => Self::String,
        }
    }

    /// Lowercase name for display and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
        }
    }
}

/// One typed, validated command parameter derived from a schema property.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    /// Property key as declared by the server.
    pub name: String,

    /// Human label derived from the key (Title Case).
    pub label: String,

    /// Semantic type.
    pub kind: ParameterKind,

    /// Whether the caller must supply a value. A parameter with a declared
    /// default is never required, regardless of the schema's required list.
    pub required: bool,

    /// Property description, when declared.
    pub description: Option<String>,

    /// Enumerated allowed values, when declared.
    pub allowed_values: Option<Vec<String>>,

    /// Lower bound, for numeric parameters.
    pub minimum: Option<f64>,

    /// Upper bound, for numeric parameters.
    pub maximum: Option<f64>,

    /// Declared default value, when present.
    pub default: Option<Value>,
}

/// Set of parameters for one tool, ordered by property name.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    pub params: Vec<ParameterSpec>,
}

impl ParameterSet {
    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Required parameters missing from the supplied values (absent or null).
    pub fn missing_required(&self, raw: &Map<String, Value>) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .filter(|p| matches!(raw.get(&p.name), None | Some(Value::Null)))
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// Map a tool's declared input schema into a typed parameter set.
pub fn parameter_set(tool: &ToolInfo) -> ParameterSet {
    let schema = &tool.input_schema;

    let required_names: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|names| names.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return ParameterSet::default();
    };

    let params = properties
        .iter()
        .map(|(key, prop)| {
            let kind = ParameterKind::from_schema_type(prop.get("type").and_then(|t| t.as_str()));
            let default = prop.get("default").cloned();

            // A defaulted parameter is never mandatory from the caller's side.
            let required = required_names.contains(&key.as_str()) && default.is_none();

            let allowed_values = prop.get("enum").and_then(|e| e.as_array()).map(|values| {
                values
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            });

            let (minimum, maximum) = if kind == ParameterKind::Number {
                (
                    prop.get("minimum").and_then(|v| v.as_f64()),
                    prop.get("maximum").and_then(|v| v.as_f64()),
                )
            } else {
                (None, None)
            };

            ParameterSpec {
                name: key.clone(),
                label: title_case(key),
                kind,
                required,
                description: prop
                    .get("description")
                    .and_then(|d| d.as_str())
                    .map(|s| s.to_string()),
                allowed_values,
                minimum,
                maximum,
                default,
            }
        })
        .collect();

    ParameterSet { params }
}

/// Coerce supplied raw values to their declared parameter types.
///
/// Absent and null values are omitted entirely, never forwarded as explicit
/// nulls. Keys without a matching parameter pass through unchanged; the
/// server owns validation of anything it declared no schema for.
pub fn parse_values(
    raw: &Map<String, Value>,
    params: &ParameterSet,
) -> Result<Map<String, Value>, SchemaError> {
    let mut structured = Map::new();

    for (key, value) in raw {
        if value.is_null() {
            continue;
        }

        match params.get(key) {
            Some(spec) => {
                structured.insert(key.clone(), coerce(value, spec)?);
            }
            None => {
                structured.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(structured)
}

fn coerce(value: &Value, spec: &ParameterSpec) -> Result<Value, SchemaError> {
    match spec.kind {
        ParameterKind::String => Ok(value.clone()),
        ParameterKind::Number => coerce_number(value, spec),
        ParameterKind::Boolean => Ok(Value::Bool(coerce_boolean(value))),
        ParameterKind::Array => Ok(coerce_array(value)),
    }
}

fn coerce_number(value: &Value, spec: &ParameterSpec) -> Result<Value, SchemaError> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Ok(Value::Number(int.into()));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| SchemaError::Coerce {
                    name: spec.name.clone(),
                    expected: "number".to_string(),
                    value: s.clone(),
                })
        }
        other => Err(SchemaError::Coerce {
            name: spec.name.clone(),
            expected: "number".to_string(),
            value: other.to_string(),
        }),
    }
}

fn coerce_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn coerce_array(value: &Value) -> Value {
    match value {
        Value::Array(_) => value.clone(),
        Value::String(s) => Value::Array(
            s.split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
        ),
        other => Value::Array(vec![other.clone()]),
    }
}

/// Normalize a call result into structured output.
///
/// A structured payload passes through unchanged. A single text item gets a
/// best-effort JSON parse with a plain-text wrapper fallback; anything else
/// renders each content item as a tagged entry.
pub fn normalize_result(result: &ToolCallResult) -> Value {
    if let Some(structured) = &result.structured {
        return structured.clone();
    }

    if let [ToolContent::Text { text }] = result.content.as_slice() {
        return parse_or_wrap(text);
    }

    Value::Array(result.content.iter().map(tag_content).collect())
}

fn parse_or_wrap(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "text": text }))
}

fn tag_content(content: &ToolContent) -> Value {
    match content {
        ToolContent::Text { text } => serde_json::json!({
            "type": "text",
            "value": parse_or_wrap(text),
        }),
        ToolContent::Image { data, mime_type } => serde_json::json!({
            "type": "image",
            "mimeType": mime_type,
            "data": data,
        }),
        ToolContent::Resource {
            uri,
            mime_type,
            text,
        } => {
            let mut entry = serde_json::json!({
                "type": "resource",
                "uri": uri,
            });
            if let Some(mime_type) = mime_type {
                entry["mimeType"] = Value::String(mime_type.clone());
            }
            if let Some(text) = text {
                entry["text"] = Value::String(text.clone());
            }
            entry
        }
    }
}

/// Render a property key as a Title Case label.
///
/// Handles both snake_case and camelCase: `max_results` and `maxResults`
/// both become `Max Results`.
pub fn title_case(key: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in key.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_ascii_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_with_schema(schema: Value) -> ToolInfo {
        ToolInfo {
            name: "test".to_string(),
            description: None,
            input_schema: schema,
            output_schema: None,
        }
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("max_results"), "Max Results");
        assert_eq!(title_case("maxResults"), "Max Results");
        assert_eq!(title_case("path"), "Path");
        assert_eq!(title_case("some-flag"), "Some Flag");
        assert_eq!(title_case("URL"), "U R L");
    }

    #[test]
    fn test_parameter_set_types_and_required() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path" },
                "count": { "type": "integer", "minimum": 1, "maximum": 100 },
                "verbose": { "type": "boolean" },
                "tags": { "type": "array" },
                "mystery": {}
            },
            "required": ["path", "count"]
        }));

        let set = parameter_set(&tool);
        assert_eq!(set.len(), 5);

        let path = set.get("path").unwrap();
        assert_eq!(path.kind, ParameterKind::String);
        assert!(path.required);
        assert_eq!(path.label, "Path");
        assert_eq!(path.description.as_deref(), Some("File path"));

        let count = set.get("count").unwrap();
        assert_eq!(count.kind, ParameterKind::Number);
        assert_eq!(count.minimum, Some(1.0));
        assert_eq!(count.maximum, Some(100.0));

        assert_eq!(set.get("verbose").unwrap().kind, ParameterKind::Boolean);
        assert_eq!(set.get("tags").unwrap().kind, ParameterKind::Array);

        // Unknown type defaults to string.
        assert_eq!(set.get("mystery").unwrap().kind, ParameterKind::String);
        assert!(!set.get("mystery").unwrap().required);
    }

    #[test]
    fn test_default_forces_optional() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "limit": { "type": "number", "default": 5 }
            },
            "required": ["limit"]
        }));

        let set = parameter_set(&tool);
        let limit = set.get("limit").unwrap();
        assert!(!limit.required, "a defaulted parameter is never required");
        assert_eq!(limit.default, Some(serde_json::json!(5)));
    }

    #[test]
    fn test_enum_values() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "mode": { "type": "string", "enum": ["fast", "slow"] },
                "level": { "type": "integer", "enum": [1, 2, 3] }
            }
        }));

        let set = parameter_set(&tool);
        assert_eq!(
            set.get("mode").unwrap().allowed_values,
            Some(vec!["fast".to_string(), "slow".to_string()])
        );
        assert_eq!(
            set.get("level").unwrap().allowed_values,
            Some(vec!["1".to_string(), "2".to_string(), "3".to_string()])
        );
    }

    #[test]
    fn test_no_schema_yields_empty_set() {
        let tool = tool_with_schema(serde_json::json!({}));
        assert!(parameter_set(&tool).is_empty());
    }

    #[test]
    fn test_parse_values_coercion() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "count": { "type": "number" },
                "verbose": { "type": "boolean" },
                "tags": { "type": "array" }
            }
        }));
        let set = parameter_set(&tool);

        let mut raw = Map::new();
        raw.insert("path".to_string(), serde_json::json!("/tmp/x"));
        raw.insert("count".to_string(), serde_json::json!("42"));
        raw.insert("verbose".to_string(), serde_json::json!("1"));
        raw.insert("tags".to_string(), serde_json::json!("a, b ,c"));

        let args = parse_values(&raw, &set).unwrap();
        assert_eq!(args.get("path"), Some(&serde_json::json!("/tmp/x")));
        assert_eq!(args.get("count"), Some(&serde_json::json!(42)));
        assert_eq!(args.get("verbose"), Some(&serde_json::json!(true)));
        assert_eq!(args.get("tags"), Some(&serde_json::json!(["a", "b", "c"])));
    }

    #[test]
    fn test_parse_values_float_and_boolean_literals() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "ratio": { "type": "number" },
                "on": { "type": "boolean" },
                "off": { "type": "boolean" }
            }
        }));
        let set = parameter_set(&tool);

        let mut raw = Map::new();
        raw.insert("ratio".to_string(), serde_json::json!("0.5"));
        raw.insert("on".to_string(), serde_json::json!("true"));
        raw.insert("off".to_string(), serde_json::json!("yes"));

        let args = parse_values(&raw, &set).unwrap();
        assert_eq!(args.get("ratio"), Some(&serde_json::json!(0.5)));
        assert_eq!(args.get("on"), Some(&serde_json::json!(true)));
        // Only "true" and "1" read as true.
        assert_eq!(args.get("off"), Some(&serde_json::json!(false)));
    }

    #[test]
    fn test_parse_values_omits_null_and_absent() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "a": { "type": "string" },
                "b": { "type": "number" },
                "c": { "type": "boolean" },
                "d": { "type": "array" }
            }
        }));
        let set = parameter_set(&tool);

        let mut raw = Map::new();
        raw.insert("a".to_string(), Value::Null);
        raw.insert("b".to_string(), Value::Null);
        raw.insert("c".to_string(), Value::Null);
        // "d" absent entirely.

        let args = parse_values(&raw, &set).unwrap();
        assert!(args.is_empty(), "nulls must never reach the server");
    }

    #[test]
    fn test_parse_values_bad_number() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": { "count": { "type": "number" } }
        }));
        let set = parameter_set(&tool);

        let mut raw = Map::new();
        raw.insert("count".to_string(), serde_json::json!("not-a-number"));

        assert!(matches!(
            parse_values(&raw, &set),
            Err(SchemaError::Coerce { .. })
        ));
    }

    #[test]
    fn test_parse_values_passes_unknown_keys() {
        let set = ParameterSet::default();
        let mut raw = Map::new();
        raw.insert("extra".to_string(), serde_json::json!({"nested": 1}));

        let args = parse_values(&raw, &set).unwrap();
        assert_eq!(args.get("extra"), Some(&serde_json::json!({"nested": 1})));
    }

    #[test]
    fn test_missing_required() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "mode": { "type": "string" }
            },
            "required": ["path"]
        }));
        let set = parameter_set(&tool);

        let raw = Map::new();
        assert_eq!(set.missing_required(&raw), vec!["path"]);

        let mut raw = Map::new();
        raw.insert("path".to_string(), serde_json::json!("/x"));
        assert!(set.missing_required(&raw).is_empty());

        let mut raw = Map::new();
        raw.insert("path".to_string(), Value::Null);
        assert_eq!(set.missing_required(&raw), vec!["path"]);
    }

    #[test]
    fn test_normalize_structured_passthrough() {
        let result = ToolCallResult {
            is_error: false,
            content: vec![ToolContent::Text {
                text: "ignored".to_string(),
            }],
            structured: Some(serde_json::json!({"answer": 42})),
        };

        assert_eq!(normalize_result(&result), serde_json::json!({"answer": 42}));
    }

    #[test]
    fn test_normalize_single_text_json_roundtrip() {
        let result = ToolCallResult::text(r#"{"files": ["a.rs", "b.rs"]}"#);
        assert_eq!(
            normalize_result(&result),
            serde_json::json!({"files": ["a.rs", "b.rs"]})
        );
    }

    #[test]
    fn test_normalize_single_text_plain_fallback() {
        let result = ToolCallResult::text("just some words");
        assert_eq!(
            normalize_result(&result),
            serde_json::json!({"text": "just some words"})
        );
    }

    #[test]
    fn test_normalize_multiple_content_items() {
        let result = ToolCallResult {
            is_error: false,
            content: vec![
                ToolContent::Text {
                    text: "{\"n\":1}".to_string(),
                },
                ToolContent::Image {
                    data: "abc".to_string(),
                    mime_type: "image/png".to_string(),
                },
                ToolContent::Resource {
                    uri: "file:///x".to_string(),
                    mime_type: None,
                    text: Some("inline".to_string()),
                },
            ],
            structured: None,
        };

        let normalized = normalize_result(&result);
        let entries = normalized.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["type"], "text");
        assert_eq!(entries[0]["value"], serde_json::json!({"n": 1}));
        assert_eq!(entries[1]["type"], "image");
        assert_eq!(entries[1]["mimeType"], "image/png");
        assert_eq!(entries[2]["type"], "resource");
        assert_eq!(entries[2]["text"], "inline");
    }
}
