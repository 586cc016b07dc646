//! Typed variable values
//!
//! Values enter the store from response properties, literal "store" steps,
//! fake data and command output. Each keeps its JSON type so that structural
//! templates can put it back into a document without quoting it.

use std::fmt;

use serde_json::{Number, Value as JsonValue};

use crate::errors::{Result, StepError};

/// Largest integer an f64 represents exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A stored variable
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    /// Objects, arrays and null
    Json(JsonValue),
}

impl Value {
    /// Classify a parsed JSON value
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::String(s) => Value::String(s),
            JsonValue::Number(n) => match n.as_f64() {
                Some(f) => Value::Number(f),
                None => Value::Json(JsonValue::Number(n)),
            },
            JsonValue::Bool(b) => Value::Boolean(b),
            other => Value::Json(other),
        }
    }

    /// Convert back into a JSON value, keeping the native type
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Number(n) => number_to_json(*n),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Json(json) => json.clone(),
        }
    }

    /// Coerce the literal text of a "store" step into a typed value.
    ///
    /// One pair of surrounding double quotes is stripped first. Text that
    /// then looks like an object or array must be valid JSON; otherwise
    /// numbers and boolean literals are recognised and everything else stays
    /// a string.
    pub fn parse_literal(text: &str) -> Result<Self> {
        let text = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(text);

        if text.starts_with('{') && text.ends_with('}') {
            let json: JsonValue = serde_json::from_str(text)
                .map_err(|e| StepError::TemplateSyntax(format!("invalid JSON object: {}", e)))?;
            return Ok(Value::Json(json));
        }

        if text.starts_with('[') && text.ends_with(']') {
            let json: JsonValue = serde_json::from_str(text)
                .map_err(|e| StepError::TemplateSyntax(format!("invalid JSON array: {}", e)))?;
            return Ok(Value::Json(json));
        }

        if let Ok(n) = text.parse::<f64>() {
            return Ok(Value::Number(n));
        }

        if let Some(b) = parse_bool_literal(text) {
            return Ok(Value::Boolean(b));
        }

        Ok(Value::String(text.to_string()))
    }

    /// Name of the variant, for log output
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Json(_) => "json",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Json(json) => write!(f, "{}", json),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_json(json)
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
        return JsonValue::from(n as i64);
    }
    Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Boolean spellings accepted by the "store" step
fn parse_bool_literal(text: &str) -> Option<bool> {
    match text {
        "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
