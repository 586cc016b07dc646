//! Variable store shared by the steps of one scenario
//!
//! Lookups never fail: an unknown name is simply absent. Entries change only
//! through explicit `set`, `delete` and `clear` calls.

mod value;

pub use value::Value;

use std::collections::HashMap;

/// Name to value mapping
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    values: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or overwrite a variable
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Remove a variable, returning its last value
    pub fn delete(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Remove every variable named in a comma-separated list
    pub fn delete_many(&mut self, names: &str) {
        for name in names.split(',') {
            self.values.remove(name.trim());
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Variable names, sorted for stable diagnostics
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
