//! Structural comparison of JSON documents
//!
//! Two modes:
//! - [`equals`] requires both trees to be identical: same keys at every
//!   object level, same array lengths, equal scalars.
//! - [`contains`] requires every key of `expected` to be present in
//!   `actual`. Objects recurse, so partial matches apply at every nesting
//!   level. Arrays and scalars are compared whole with [`equals`]; an
//!   expected array is never matched element-wise as a subset.
//!
//! The first difference found is returned with the path that leads to it.

use std::fmt;

use serde_json::{Map, Value as JsonValue};

use crate::errors::{Result, StepError};

/// Placeholder shown for the missing side of an extra key
const ABSENT: &str = "<absent>";

/// Location inside a JSON document, rendered as `a.b[0].c`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

impl JsonPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn key(&self, key: &str) -> Self {
        let mut path = self.clone();
        path.segments.push(PathSegment::Key(key.to_string()));
        path
    }

    pub fn index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.segments.push(PathSegment::Index(index));
        path
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("$");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Require `actual` to be exactly `expected`
pub fn equals(expected: &JsonValue, actual: &JsonValue) -> Result<()> {
    equals_at(&JsonPath::root(), expected, actual)
}

/// Require `actual` to contain everything in `expected`
pub fn contains(expected: &JsonValue, actual: &JsonValue) -> Result<()> {
    contains_at(&JsonPath::root(), expected, actual)
}

fn equals_at(path: &JsonPath, expected: &JsonValue, actual: &JsonValue) -> Result<()> {
    match (expected, actual) {
        (JsonValue::Object(exp), JsonValue::Object(act)) => {
            for (key, exp_val) in exp {
                let act_val = act
                    .get(key)
                    .ok_or_else(|| missing(&path.key(key)))?;
                equals_at(&path.key(key), exp_val, act_val)?;
            }
            if let Some((key, act_val)) = act.iter().find(|(key, _)| !exp.contains_key(*key)) {
                return Err(StepError::mismatch(path.key(key).to_string(), ABSENT, act_val));
            }
            Ok(())
        }
        (JsonValue::Array(exp), JsonValue::Array(act)) => {
            if exp.len() != act.len() {
                return Err(StepError::mismatch(
                    path.to_string(),
                    format!("array of length {}", exp.len()),
                    format!("array of length {}", act.len()),
                ));
            }
            for (i, (exp_item, act_item)) in exp.iter().zip(act).enumerate() {
                equals_at(&path.index(i), exp_item, act_item)?;
            }
            Ok(())
        }
        _ if scalars_equal(expected, actual) => Ok(()),
        _ => Err(StepError::mismatch(path.to_string(), expected, actual)),
    }
}

fn contains_at(path: &JsonPath, expected: &JsonValue, actual: &JsonValue) -> Result<()> {
    match (expected, actual) {
        (JsonValue::Object(exp), JsonValue::Object(act)) => contains_object(path, exp, act),
        _ => equals_at(path, expected, actual),
    }
}

fn contains_object(
    path: &JsonPath,
    expected: &Map<String, JsonValue>,
    actual: &Map<String, JsonValue>,
) -> Result<()> {
    for (key, exp_val) in expected {
        let key_path = path.key(key);
        let act_val = actual.get(key).ok_or_else(|| missing(&key_path))?;
        contains_at(&key_path, exp_val, act_val)?;
    }
    Ok(())
}

/// Scalar equality; numbers compare as f64
fn scalars_equal(expected: &JsonValue, actual: &JsonValue) -> bool {
    match (expected, actual) {
        (JsonValue::Null, JsonValue::Null) => true,
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a == b,
        (JsonValue::String(a), JsonValue::String(b)) => a == b,
        (JsonValue::Number(a), JsonValue::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

fn missing(path: &JsonPath) -> StepError {
    StepError::PropertyNotFound { path: path.to_string() }
}
