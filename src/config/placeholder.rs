//! Config placeholders: `{ "_source": ..., "_key": ..., "_type"?, "_default"? }`.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SOURCE_FIELD: &str = "_source";
const KEY_FIELD: &str = "_key";
const TYPE_FIELD: &str = "_type";
const DEFAULT_FIELD: &str = "_default";

/// The type a placeholder expects its resolved value to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedType {
    String,
    Number,
    Object,
    Array,
    Boolean,
}

impl ExpectedType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ExpectedType::String),
            "number" => Some(ExpectedType::Number),
            "object" => Some(ExpectedType::Object),
            "array" => Some(ExpectedType::Array),
            "boolean" => Some(ExpectedType::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectedType::String => "string",
            ExpectedType::Number => "number",
            ExpectedType::Object => "object",
            ExpectedType::Array => "array",
            ExpectedType::Boolean => "boolean",
        }
    }

    /// Coerce a fetched value into this type.
    ///
    /// Remote stores mostly hand back strings, so a string that parses as the
    /// expected type is accepted.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (self, value) {
            (ExpectedType::String, Value::String(s)) => Ok(Value::String(s)),
            (ExpectedType::String, v @ (Value::Number(_) | Value::Bool(_))) => {
                Ok(Value::String(v.to_string()))
            }
            (ExpectedType::Number, Value::Number(n)) => Ok(Value::Number(n)),
            (ExpectedType::Number, Value::String(s)) => parse_number(s.trim())
                .map(Value::Number)
                .ok_or_else(|| self.mismatch(format!("'{}' is not a number", s))),
            (ExpectedType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ExpectedType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str()
            {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(self.mismatch(format!("'{}' is not a boolean", s))),
            },
            (ExpectedType::Object, v @ Value::Object(_)) => Ok(v),
            (ExpectedType::Array, v @ Value::Array(_)) => Ok(v),
            (ExpectedType::Object | ExpectedType::Array, Value::String(s)) => {
                let parsed: Value = serde_json::from_str(&s)
                    .map_err(|e| self.mismatch(format!("cannot parse '{}': {}", s, e)))?;
                match (self, &parsed) {
                    (ExpectedType::Object, Value::Object(_))
                    | (ExpectedType::Array, Value::Array(_)) => Ok(parsed),
                    _ => Err(self.mismatch(format!("'{}' has the wrong shape", s))),
                }
            }
            (_, other) => Err(self.mismatch(format!("got {}", json_type_name(&other)))),
        }
    }

    fn mismatch(&self, message: String) -> ConfigError {
        ConfigError::InvalidType {
            expected: self.as_str().to_string(),
            message,
        }
    }
}

impl std::fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_number(s: &str) -> Option<serde_json::Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i.into());
    }
    s.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
}

/// JSON type name used in diagnostics.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An unresolved reference to a named resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderSpec {
    /// Resolver name (`env`, `process`, or a registered resolver).
    pub source_name: String,
    /// Key to look up in that resolver.
    pub key: String,
    pub expected_type: Option<ExpectedType>,
    pub default: Option<Value>,
}

impl PlaceholderSpec {
    pub fn new(source_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            key: key.into(),
            expected_type: None,
            default: None,
        }
    }

    pub fn with_type(mut self, expected: ExpectedType) -> Self {
        self.expected_type = Some(expected);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Recognize a placeholder object.
    ///
    /// Returns `None` unless the keys are exactly `_source` and `_key` plus
    /// the optional `_type` and `_default`, with string-valued source and key
    /// and a known type name.
    pub fn detect(map: &Map<String, Value>) -> Option<Self> {
        if !map.keys().all(|k| is_placeholder_field(k)) {
            return None;
        }
        let source_name = map.get(SOURCE_FIELD)?.as_str()?;
        let key = map.get(KEY_FIELD)?.as_str()?;
        let expected_type = match map.get(TYPE_FIELD) {
            Some(Value::String(t)) => Some(ExpectedType::parse(t)?),
            Some(_) => return None,
            None => None,
        };
        Some(Self {
            source_name: source_name.to_string(),
            key: key.to_string(),
            expected_type,
            default: map.get(DEFAULT_FIELD).cloned(),
        })
    }

    /// Back to the wire shape.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(SOURCE_FIELD.into(), Value::String(self.source_name.clone()));
        map.insert(KEY_FIELD.into(), Value::String(self.key.clone()));
        if let Some(t) = self.expected_type {
            map.insert(TYPE_FIELD.into(), Value::String(t.as_str().into()));
        }
        if let Some(ref d) = self.default {
            map.insert(DEFAULT_FIELD.into(), d.clone());
        }
        Value::Object(map)
    }
}

/// True if `key` may appear in a placeholder object.
pub fn is_placeholder_field(key: &str) -> bool {
    matches!(key, SOURCE_FIELD | KEY_FIELD | TYPE_FIELD | DEFAULT_FIELD)
}
