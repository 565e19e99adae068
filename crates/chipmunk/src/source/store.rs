//! Snapshot record store shared by the bundled sources.
//!
//! Records live behind an `Arc` guarded by a `RwLock`. Readers clone the
//! `Arc` and work on an immutable snapshot; writers copy-on-write under the
//! write lock; reloads build the replacement outside the lock and swap it in
//! with a single assignment, so no reader ever sees a half-applied reload.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A single key/value pair held by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: Value,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Insertion-ordered records with a key index.
#[derive(Debug, Clone, Default)]
pub struct Records {
    entries: Vec<Record>,
    index: HashMap<String, usize>,
}

impl Records {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&idx| &self.entries[idx].value)
    }

    /// ASCII case-insensitive lookup; the first matching record wins.
    pub fn get_ignore_case(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        self.entries
            .iter()
            .find(|record| record.key.eq_ignore_ascii_case(key))
            .map(|record| &record.value)
    }

    /// Insert or overwrite; overwrites keep the original position.
    pub fn insert(&mut self, key: String, value: Value) {
        match self.index.get(&key) {
            Some(&idx) => self.entries[idx].value = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(Record { key, value });
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.index.remove(key)?;
        let record = self.entries.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(record.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|record| record.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter()
    }
}

impl FromIterator<(String, Value)> for Records {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut records = Records::new();
        for (key, value) in iter {
            records.insert(key, value);
        }
        records
    }
}

/// Thread-safe holder of a source's current record set.
#[derive(Debug, Default)]
pub struct RecordStore {
    current: RwLock<Arc<Records>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Records) -> Self {
        Self {
            current: RwLock::new(Arc::new(records)),
        }
    }

    /// Immutable view of the records at this instant.
    pub fn snapshot(&self) -> Arc<Records> {
        Arc::clone(&self.current.read())
    }

    /// Replace the whole record set in one step.
    pub fn replace(&self, records: Records) {
        let next = Arc::new(records);
        *self.current.write() = next;
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.current.read().get(key).cloned()
    }

    pub fn get_ignore_case(&self, key: &str) -> Option<Value> {
        self.current.read().get_ignore_case(key).cloned()
    }

    pub fn set(&self, key: String, value: Value) {
        let mut guard = self.current.write();
        Arc::make_mut(&mut *guard).insert(key, value);
    }

    /// Return the stored value, or store and return `value`, under one lock.
    pub fn get_or_set(&self, key: String, value: Value) -> Value {
        let mut guard = self.current.write();
        if let Some(existing) = guard.get(&key) {
            return existing.clone();
        }
        Arc::make_mut(&mut *guard).insert(key, value.clone());
        value
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut guard = self.current.write();
        if guard.get(key).is_none() {
            return false;
        }
        Arc::make_mut(&mut *guard).remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.snapshot().keys().map(str::to_string).collect()
    }

    pub fn read(&self) -> Vec<Record> {
        self.snapshot().iter().cloned().collect()
    }
}
