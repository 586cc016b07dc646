//! Placeholder templating
//!
//! Steps reference stored variables with `${name}`. Text templates (URLs,
//! headers, payloads, command lines) go through [`resolve`]; expected JSON
//! documents go through [`resolve_json`], which falls back to the
//! type-preserving resolver in [`structural`] when plain substitution does
//! not produce valid JSON.
//!
//! Substitution is a single pass. A stored string that itself contains
//! `${...}` is emitted as-is, and there is no escape for a literal `${`.

pub mod structural;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::errors::{Result, StepError};
use crate::store::VariableStore;

/// A piece of a tokenized template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text copied through unchanged
    Literal(&'a str),
    /// A `${name}` reference; `raw` is the full token including braces
    Placeholder { name: &'a str, raw: &'a str },
}

/// Split a template into literal and placeholder segments.
///
/// A placeholder is `${` followed by at least one character up to the next
/// `}`. `${}` and an unterminated `${` are literal text.
pub fn tokenize(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(offset) = text[pos..].find("${") {
        let start = pos + offset;
        let name_start = start + 2;

        match text[name_start..].find('}') {
            Some(0) => pos = start + 1,
            Some(len) => {
                if literal_start < start {
                    segments.push(Segment::Literal(&text[literal_start..start]));
                }
                let end = name_start + len + 1;
                segments.push(Segment::Placeholder {
                    name: &text[name_start..name_start + len],
                    raw: &text[start..end],
                });
                pos = end;
                literal_start = end;
            }
            None => break,
        }
    }

    if literal_start < text.len() {
        segments.push(Segment::Literal(&text[literal_start..]));
    }

    segments
}

/// Replace every `${name}` with the stored value's string form.
///
/// Unknown names are left in place so that a later assertion shows the
/// unresolved token instead of silently comparing against an empty string.
pub fn resolve(text: &str, store: &VariableStore) -> String {
    if !text.contains("${") {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len());
    for segment in tokenize(text) {
        match segment {
            Segment::Literal(s) => result.push_str(s),
            Segment::Placeholder { name, raw } => match store.get(name) {
                Some(value) => result.push_str(&value.to_string()),
                None => result.push_str(raw),
            },
        }
    }
    result
}

/// Names referenced by a template, in order of first appearance
pub fn placeholder_names(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    for segment in tokenize(text) {
        if let Segment::Placeholder { name, .. } = segment {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Materialize an expected-JSON template into a parsed document.
///
/// Text substitution followed by a direct parse handles the common case
/// where every placeholder sits inside a string literal or stands for a
/// number. When that fails to parse, the template is resolved structurally.
pub fn resolve_json(template: &str, store: &VariableStore) -> Result<JsonValue> {
    let text = resolve(template, store);
    match serde_json::from_str(&text) {
        Ok(json) => Ok(json),
        Err(e) => {
            debug!(error = %e, "substituted template is not valid JSON, resolving structurally");
            let resolved = structural::resolve(template, store)?;
            serde_json::from_str(&resolved).map_err(|e| {
                StepError::TemplateSyntax(format!("still invalid JSON after resolving: {}", e))
            })
        }
    }
}
