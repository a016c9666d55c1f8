//! Validation of structured model output.
//!
//! Raw text goes through three steps: JSON parsing, a shape check against the
//! response contract (presence, non-null, JSON type, recursively), and strict
//! typed deserialization. The outcome is either a complete typed value or a
//! [`CoreError::MalformedResponse`] naming the offending fields.

use serde_json::Value;
use tracing::{debug, instrument};

use crate::contract::StructuredResponse;
use crate::error::CoreError;

/// Parse and validate a structured response.
///
/// Surrounding whitespace and a single Markdown code fence are tolerated.
///
/// # Errors
///
/// Returns `CoreError::MalformedResponse` if the text is not JSON, a required
/// field is absent or null, or a field has the wrong JSON type.
///
/// # Examples
///
/// ```
/// use pitchbot_core::{RatingResult, parse_and_validate};
///
/// let raw = r#"{"successScore": 72, "keyStrengths": ["timing"],
///               "potentialWeaknesses": [], "actionableAdvice": []}"#;
/// let rating: RatingResult = parse_and_validate(raw).expect("valid rating");
/// assert_eq!(rating.success_score, 72);
/// ```
#[instrument(skip_all, fields(len = raw.len()))]
pub fn parse_and_validate<T: StructuredResponse>(raw: &str) -> Result<T, CoreError> {
    let kind = T::KIND;
    let payload = strip_code_fence(raw);
    if payload.is_empty() {
        return Err(CoreError::malformed(kind, "response is empty"));
    }

    let value: Value = serde_json::from_str(payload)
        .map_err(|e| CoreError::malformed(kind, format!("not valid JSON: {e}")))?;

    let contract = T::contract();
    let mut problems = Vec::new();
    check_shape(&contract.schema, &value, "", &mut problems);
    if !problems.is_empty() {
        debug!(%kind, count = problems.len(), "response failed shape check");
        return Err(CoreError::malformed(kind, problems.join("; ")));
    }

    serde_json::from_value(value).map_err(|e| CoreError::malformed(kind, e.to_string()))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    match body.split_once('\n') {
        // The first line carries the optional language tag.
        Some((_, body)) => body.trim(),
        None => body.strip_prefix("json").unwrap_or(body).trim(),
    }
}

fn check_shape(schema: &Value, value: &Value, path: &str, problems: &mut Vec<String>) {
    let expected = schema.get("type").and_then(Value::as_str).unwrap_or_default();
    if !matches_type(expected, value) {
        problems.push(format!(
            "`{}` should be {}, found {}",
            display_path(path),
            describe_type(expected),
            json_type_name(value),
        ));
        return;
    }

    match (expected, value) {
        ("OBJECT", Value::Object(fields)) => {
            let properties = schema.get("properties").and_then(Value::as_object);
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            for name in &required {
                let child_path = join_path(path, name);
                match fields.get(*name) {
                    None | Some(Value::Null) => {
                        problems.push(format!("`{child_path}` is missing"));
                    }
                    Some(child) => {
                        if let Some(child_schema) = properties.and_then(|p| p.get(*name)) {
                            check_shape(child_schema, child, &child_path, problems);
                        }
                    }
                }
            }

            // Optional properties are checked only when present.
            for (name, child_schema) in properties.into_iter().flatten() {
                if required.contains(&name.as_str()) {
                    continue;
                }
                if let Some(child) = fields.get(name)
                    && !child.is_null()
                {
                    check_shape(child_schema, child, &join_path(path, name), problems);
                }
            }
        }
        ("ARRAY", Value::Array(items)) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check_shape(item_schema, item, &format!("{path}[{i}]"), problems);
                }
            }
        }
        _ => {}
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "OBJECT" => value.is_object(),
        "ARRAY" => value.is_array(),
        "STRING" => value.is_string(),
        "INTEGER" => value.is_i64() || value.is_u64(),
        "NUMBER" => value.is_number(),
        "BOOLEAN" => value.is_boolean(),
        _ => true,
    }
}

fn describe_type(expected: &str) -> &'static str {
    match expected {
        "OBJECT" => "an object",
        "ARRAY" => "an array",
        "STRING" => "a string",
        "INTEGER" => "an integer",
        "NUMBER" => "a number",
        "BOOLEAN" => "a boolean",
        _ => "a value",
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}.{name}")
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "response" } else { path }
}
