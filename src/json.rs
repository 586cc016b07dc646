//! JSON utilities
//!
//! Property paths address values inside a response body:
//! - `data.id` walks object keys;
//! - `items.0.name` indexes arrays by position;
//! - `items.#` is the length of an array;
//! - `a\.b` is a key that contains a literal dot.

use serde_json::Value as JsonValue;

use crate::errors::{Result, StepError};

/// Parse a response body, preserving key order
pub fn parse_body(body: &str) -> Result<JsonValue> {
    serde_json::from_str(body).map_err(|e| StepError::InvalidResponse(e.to_string()))
}

/// Split a property path on unescaped dots
fn split_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '.' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Look up a property path. Returns `None` when any segment is missing.
pub fn lookup(root: &JsonValue, path: &str) -> Option<JsonValue> {
    if path.is_empty() {
        return Some(root.clone());
    }

    let mut current = root;
    let parts = split_path(path);
    let last = parts.len() - 1;

    for (i, part) in parts.iter().enumerate() {
        current = match current {
            JsonValue::Object(map) => map.get(part.as_str())?,
            JsonValue::Array(items) if part == "#" => {
                return (i == last).then(|| JsonValue::from(items.len()));
            }
            JsonValue::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current.clone())
}

/// String form used by property assertions: strings unquoted, null empty,
/// everything else compact JSON
pub fn render_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Lenient boolean reading of a property
pub fn as_bool(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        JsonValue::String(s) => matches!(s.as_str(), "1" | "t" | "T" | "true" | "TRUE" | "True"),
        _ => false,
    }
}

/// Lenient numeric reading of a property
pub fn as_f64(value: &JsonValue) -> f64 {
    match value {
        JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
        JsonValue::String(s) => s.trim().parse().unwrap_or(0.0),
        JsonValue::Bool(true) => 1.0,
        _ => 0.0,
    }
}
