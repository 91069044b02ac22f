// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Shared run state — a mutable key-value store scoped to one execution.
//!
//! Every node invocation in a run reads and writes the same store; separate
//! runs never share one. Writes are last-write-wins, which is sufficient
//! because the dispatch loop never has more than one invocation in flight.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// String-keyed JSON store visible to every node invocation within a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    entries: HashMap<String, Value>,
}

impl RunState {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Write a value, returning the previous one if present.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Remove a value, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// True if the key has been written.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}
