//! Legacy tag normalization.
//!
//! The legacy `tags` field is a free-form object, stored either natively or
//! as a JSON-encoded string. The replacement `tag` field is a list of
//! `key=value` strings in the object's key order.

use serde_json::{Map, Value};

use crate::TagError;

/// Ordered `key=value` strings derived from a legacy tags object.
pub type NormalizedTagSet = Vec<String>;

/// Convert a legacy tags value into `key=value` pairs.
///
/// Keys and values are not escaped, so a `=` inside a key produces an
/// ambiguous pair. Duplicate keys cannot occur since the input is an object.
pub fn normalize_tags(legacy: &Value) -> Result<NormalizedTagSet, TagError> {
    let decoded;
    let map = match legacy {
        Value::String(encoded) => {
            decoded = serde_json::from_str::<Value>(encoded)?;
            as_mapping(&decoded)?
        }
        other => as_mapping(other)?,
    };

    Ok(map
        .iter()
        .map(|(key, value)| format!("{}={}", key, value_text(value)))
        .collect())
}

fn as_mapping(value: &Value) -> Result<&Map<String, Value>, TagError> {
    value
        .as_object()
        .ok_or_else(|| TagError::NotAMapping(kind_name(value)))
}

/// Textual form of a tag value. Arrays flatten to comma-joined elements.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(element_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Array elements join like string coercion does: `null` is empty.
fn element_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => value_text(other),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
