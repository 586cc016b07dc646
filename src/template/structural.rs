//! Type-preserving resolution of JSON templates
//!
//! A template such as `{"age": ${age}, "user": ${user}}` is not JSON until
//! its placeholders are filled in, and text substitution cannot put a string
//! or a missing value into a raw position without breaking the syntax. Here
//! each placeholder is first swapped for a synthetic string token so the
//! template parses, then the parsed tree is walked and tokens are replaced
//! with stored values:
//!
//! - a placeholder in a raw position becomes the value itself, keeping its
//!   JSON type (numbers stay numbers, objects stay objects);
//! - a placeholder inside a string literal is substituted as text, so
//!   `"Hello ${name}"` stays a string and is escaped on output.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};
use tracing::debug;
use uuid::Uuid;

use super::{tokenize, Segment};
use crate::errors::{Result, StepError};
use crate::store::VariableStore;

/// A placeholder that was swapped out for a synthetic token
#[derive(Debug)]
struct Slot<'a> {
    token: String,
    name: &'a str,
    raw: &'a str,
    in_string: bool,
}

/// Tokenized template with its slot table
struct Tokenized<'a> {
    text: String,
    slots: Vec<Slot<'a>>,
}

impl<'a> Tokenized<'a> {
    fn new(template: &'a str) -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        let mut text = String::with_capacity(template.len() + 32);
        let mut slots = Vec::new();
        let mut scanner = StringScanner::default();

        for segment in tokenize(template) {
            match segment {
                Segment::Literal(s) => {
                    scanner.feed(s);
                    text.push_str(s);
                }
                Segment::Placeholder { name, raw } => {
                    let token = format!("__stepwise_{}_{}__", nonce, slots.len());
                    let in_string = scanner.in_string();
                    if in_string {
                        text.push_str(&token);
                    } else {
                        text.push('"');
                        text.push_str(&token);
                        text.push('"');
                    }
                    scanner.after_placeholder();
                    slots.push(Slot { token, name, raw, in_string });
                }
            }
        }

        Self { text, slots }
    }
}

/// Tracks whether the scan position is inside a JSON string literal
#[derive(Default)]
struct StringScanner {
    in_string: bool,
    escaped: bool,
}

impl StringScanner {
    fn feed(&mut self, s: &str) {
        for c in s.chars() {
            if !self.in_string {
                if c == '"' {
                    self.in_string = true;
                }
            } else if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = false;
            }
        }
    }

    fn in_string(&self) -> bool {
        self.in_string
    }

    fn after_placeholder(&mut self) {
        self.escaped = false;
    }
}

/// Resolves one template against a store
struct Resolver<'s, 'a> {
    store: &'s VariableStore,
    slots: &'s [Slot<'a>],
    raw_tokens: HashMap<&'s str, &'s Slot<'a>>,
}

impl<'s, 'a> Resolver<'s, 'a> {
    fn new(store: &'s VariableStore, slots: &'s [Slot<'a>]) -> Self {
        let raw_tokens = slots
            .iter()
            .filter(|slot| !slot.in_string)
            .map(|slot| (slot.token.as_str(), slot))
            .collect();
        Self { store, slots, raw_tokens }
    }

    fn resolve_value(&self, value: JsonValue) -> Result<JsonValue> {
        match value {
            JsonValue::String(s) => {
                if let Some(slot) = self.raw_tokens.get(s.as_str()) {
                    return match self.store.get(slot.name) {
                        Some(stored) => Ok(stored.to_json()),
                        None => Err(StepError::TemplateSyntax(format!(
                            "unresolved placeholder {} in a non-string position",
                            slot.raw
                        ))),
                    };
                }
                Ok(JsonValue::String(self.substitute_text(s)))
            }
            JsonValue::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, value) in map {
                    let key = self.resolve_key(key)?;
                    resolved.insert(key, self.resolve_value(value)?);
                }
                Ok(JsonValue::Object(resolved))
            }
            JsonValue::Array(items) => items
                .into_iter()
                .map(|item| self.resolve_value(item))
                .collect::<Result<Vec<_>>>()
                .map(JsonValue::Array),
            other => Ok(other),
        }
    }

    /// Keys are always strings, so a raw placeholder key takes the text form
    fn resolve_key(&self, key: String) -> Result<String> {
        if let Some(slot) = self.raw_tokens.get(key.as_str()) {
            return match self.store.get(slot.name) {
                Some(stored) => Ok(stored.to_string()),
                None => Err(StepError::TemplateSyntax(format!(
                    "unresolved placeholder {} used as an object key",
                    slot.raw
                ))),
            };
        }
        Ok(self.substitute_text(key))
    }

    fn substitute_text(&self, mut s: String) -> String {
        for slot in self.slots.iter().filter(|slot| slot.in_string) {
            if s.contains(&slot.token) {
                let replacement = match self.store.get(slot.name) {
                    Some(stored) => stored.to_string(),
                    None => slot.raw.to_string(),
                };
                s = s.replace(&slot.token, &replacement);
            }
        }
        s
    }
}

/// Resolve a JSON template to canonical JSON text, preserving value types.
///
/// Fails with [`StepError::TemplateSyntax`] when the template is not JSON
/// once its placeholders are tokenized, or when a placeholder in a raw
/// position names a variable that is not stored.
pub fn resolve(template: &str, store: &VariableStore) -> Result<String> {
    let tokenized = Tokenized::new(template);
    debug!(placeholders = tokenized.slots.len(), "resolving JSON template structurally");

    let tree: JsonValue = serde_json::from_str(&tokenized.text)
        .map_err(|e| StepError::TemplateSyntax(format!("malformed JSON template: {}", e)))?;

    let resolver = Resolver::new(store, &tokenized.slots);
    let resolved = resolver.resolve_value(tree)?;

    Ok(serde_json::to_string(&resolved)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Value;
    use serde_json::json;

    fn parse(text: &str) -> JsonValue {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_number_stays_numeric() {
        let mut store = VariableStore::new();
        store.set("age", 30.0);

        let out = resolve(r#"{"age": ${age}}"#, &store).unwrap();
        let json = parse(&out);
        assert!(json["age"].is_number());
        assert_eq!(json["age"].as_f64(), Some(30.0));
    }

    #[test]
    fn test_native_types_are_preserved() {
        let mut store = VariableStore::new();
        store.set("name", "John");
        store.set("active", true);
        store.set("user", Value::Json(json!({"id": 7, "roles": ["admin"]})));
        store.set("ids", Value::Json(json!([1, 2, 3])));

        let out = resolve(
            r#"{"name": ${name}, "active": ${active}, "user": ${user}, "ids": ${ids}}"#,
            &store,
        )
        .unwrap();
        assert_eq!(
            parse(&out),
            json!({
                "name": "John",
                "active": true,
                "user": {"id": 7, "roles": ["admin"]},
                "ids": [1, 2, 3]
            })
        );
    }

    #[test]
    fn test_quoted_and_raw_placeholders_mix() {
        let mut store = VariableStore::new();
        store.set("name", "John \"JJ\" Doe");
        store.set("age", 41.0);

        let out = resolve(r#"{"greeting": "Hello ${name}!", "age": ${age}}"#, &store).unwrap();
        assert_eq!(parse(&out), json!({"greeting": "Hello John \"JJ\" Doe!", "age": 41}));
    }

    #[test]
    fn test_nested_arrays_and_keys() {
        let mut store = VariableStore::new();
        store.set("field", "score");
        store.set("n", 2.5);

        let out = resolve(r#"{"items": [{"${field}": ${n}}, ${n}]}"#, &store).unwrap();
        assert_eq!(parse(&out), json!({"items": [{"score": 2.5}, 2.5]}));
    }

    #[test]
    fn test_missing_raw_placeholder_fails_loudly() {
        let store = VariableStore::new();
        let err = resolve(r#"{"age": ${age}}"#, &store).unwrap_err();
        match err {
            StepError::TemplateSyntax(msg) => {
                assert!(msg.contains("${age}"));
                assert!(!msg.contains("__stepwise_"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_quoted_placeholder_stays_literal() {
        let store = VariableStore::new();
        let out = resolve(r#"{"name": "${name}", "n": 1}"#, &store).unwrap();
        assert_eq!(parse(&out), json!({"name": "${name}", "n": 1}));
    }

    #[test]
    fn test_escaped_quotes_keep_string_context() {
        let mut store = VariableStore::new();
        store.set("x", 5.0);
        let out = resolve(r#"{"a": "say \"${x}\"", "b": ${x}}"#, &store).unwrap();
        assert_eq!(parse(&out), json!({"a": "say \"5\"", "b": 5}));
    }

    #[test]
    fn test_malformed_template() {
        let store = VariableStore::new();
        let err = resolve(r#"{"a": ${a}${b}}"#, &store).unwrap_err();
        assert!(matches!(err, StepError::TemplateSyntax(_)));
    }

    #[test]
    fn test_template_without_placeholders_is_canonicalised() {
        let store = VariableStore::new();
        let out = resolve("{ \"a\" : [ 1 , 2 ] }", &store).unwrap();
        assert_eq!(out, r#"{"a":[1,2]}"#);
    }
}
