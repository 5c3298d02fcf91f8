//! Schema validation for configuration values.
//!
//! The engine decides when and against what to validate; a
//! [`SchemaValidator`] decides whether a value conforms. [`BasicValidator`]
//! covers the commonly used JSON-schema keywords:
//! `type`, `enum`, `const`, `properties`, `required`, `additionalProperties`,
//! `items`, `minimum`, `maximum`, `minLength`, `maxLength`, `minItems`,
//! `maxItems`.

use super::placeholder::json_type_name;
use serde_json::Value;

/// Checks a value against a schema.
pub trait SchemaValidator: Send + Sync {
    /// Every violation found; empty when the value conforms.
    fn validate(&self, schema: &Value, value: &Value) -> Vec<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BasicValidator;

impl SchemaValidator for BasicValidator {
    fn validate(&self, schema: &Value, value: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        check(schema, value, "", &mut errors);
        errors
    }
}

fn location(at: &str) -> &str {
    if at.is_empty() { "<root>" } else { at }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        other => json_type_name(value) == other,
    }
}

fn check(schema: &Value, value: &Value, at: &str, errors: &mut Vec<String>) {
    let Value::Object(schema) = schema else {
        // `true`/`{}` accept anything; `false` rejects everything.
        if schema == &Value::Bool(false) {
            errors.push(format!("{}: no value is allowed here", location(at)));
        }
        return;
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, value)) {
            errors.push(format!(
                "{}: expected {}, got {}",
                location(at),
                allowed.join(" or "),
                json_type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum")
        && !options.contains(value)
    {
        errors.push(format!("{}: value is not one of the allowed values", location(at)));
    }
    if let Some(expected) = schema.get("const")
        && expected != value
    {
        errors.push(format!("{}: value must equal {}", location(at), expected));
    }

    match value {
        Value::Object(map) => {
            if let Some(Value::Array(required)) = schema.get("required") {
                for name in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(name) {
                        errors.push(format!("{}: missing required property '{}'", location(at), name));
                    }
                }
            }
            let properties = schema.get("properties").and_then(Value::as_object);
            for (key, child) in map {
                let child_at = if at.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", at, key)
                };
                match properties.and_then(|p| p.get(key)) {
                    Some(child_schema) => check(child_schema, child, &child_at, errors),
                    None => match schema.get("additionalProperties") {
                        Some(Value::Bool(false)) => {
                            errors.push(format!("{}: property is not allowed", child_at))
                        }
                        Some(extra @ Value::Object(_)) => check(extra, child, &child_at, errors),
                        _ => {}
                    },
                }
            }
        }
        Value::Array(items) => {
            if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
                && (items.len() as u64) < min
            {
                errors.push(format!("{}: expected at least {} items", location(at), min));
            }
            if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
                && (items.len() as u64) > max
            {
                errors.push(format!("{}: expected at most {} items", location(at), max));
            }
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    let item_at = if at.is_empty() {
                        i.to_string()
                    } else {
                        format!("{}.{}", at, i)
                    };
                    check(item_schema, item, &item_at, errors);
                }
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
                && n < min
            {
                errors.push(format!("{}: {} is below the minimum {}", location(at), n, min));
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
                && n > max
            {
                errors.push(format!("{}: {} is above the maximum {}", location(at), n, max));
            }
        }
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
                && len < min
            {
                errors.push(format!("{}: shorter than {} characters", location(at), min));
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
                && len > max
            {
                errors.push(format!("{}: longer than {} characters", location(at), max));
            }
        }
        _ => {}
    }
}
