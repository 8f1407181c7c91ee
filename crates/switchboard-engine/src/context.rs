use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use switchboard_core::types::RunRecord;

/// Shared execution context for one orchestration run.
///
/// Mutable key/value variables plus an append-only execution history.
/// Owned exclusively by one run; plain serializable data so an external
/// serializer can snapshot/restore it. Keys are strings, values JSON,
/// last-write-wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    variables: HashMap<String, serde_json::Value>,
    history: Vec<RunRecord>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with initial variables.
    pub fn from_map(variables: HashMap<String, serde_json::Value>) -> Self {
        Self {
            variables,
            history: Vec::new(),
        }
    }

    /// Get a variable by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }

    /// Get a variable as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.variables.get(key).and_then(|v| v.as_str())
    }

    /// Set a variable (overwrites).
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.variables.insert(key.into(), value);
    }

    /// Bulk overwrite from a mapping.
    pub fn update(&mut self, mapping: HashMap<String, serde_json::Value>) {
        for (k, v) in mapping {
            self.variables.insert(k, v);
        }
    }

    /// Immutable copy of the current variables (e.g. for persistence or
    /// scorer calls).
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.variables.clone()
    }

    /// Append a run record. The only mutator the orchestration loop itself
    /// invokes; history is never reordered or edited.
    pub fn append(&mut self, record: RunRecord) {
        self.history.push(record);
    }

    /// The underlying variables map.
    pub fn variables(&self) -> &HashMap<String, serde_json::Value> {
        &self.variables
    }

    /// Execution history, one record per successful agent execution.
    pub fn history(&self) -> &[RunRecord] {
        &self.history
    }

    /// Consume the context, returning (variables, history).
    pub fn into_parts(self) -> (HashMap<String, serde_json::Value>, Vec<RunRecord>) {
        (self.variables, self.history)
    }
}
