//! In-process source with no backing store.

use super::{RecordStore, Records, Source, SourceType};
use crate::SourceError;
use log::debug;
use serde_json::Value;

/// Default alias for memory sources.
const DEFAULT_ALIAS: &str = "memory";

/// Values held only in process memory. `load` and `reload` are no-ops.
#[derive(Debug)]
pub struct MemorySource {
    alias: String,
    store: RecordStore,
}

impl MemorySource {
    /// Empty source aliased `memory`.
    pub fn new() -> Self {
        Self::with_alias(DEFAULT_ALIAS)
    }

    pub fn with_alias(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            store: RecordStore::new(),
        }
    }

    /// Seed records from key/value pairs.
    pub fn with_values<K, V, I>(mut self, values: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let records: Records = values
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.store = RecordStore::from_records(records);
        self
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl Source for MemorySource {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn source_type(&self) -> SourceType {
        SourceType::Memory
    }

    fn store(&self) -> &RecordStore {
        &self.store
    }

    fn load(&self) -> Result<(), SourceError> {
        debug!("memory source has no backing store (alias={})", self.alias);
        Ok(())
    }

    fn reload(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn get_or_set_keeps_first_value() {
        let source = MemorySource::new();
        assert_eq!(source.get_or_set("k", json!("first")), json!("first"));
        assert_eq!(source.get_or_set("k", json!("second")), json!("first"));
        assert_eq!(source.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn get_or_default_never_stores() {
        let source = MemorySource::new();
        assert_eq!(source.get_or_default("missing", json!(7)), json!(7));
        assert!(source.keys().is_empty());
    }

    #[test]
    fn load_keeps_seeded_values() {
        let source = MemorySource::with_alias("defaults").with_values([("port", 8080)]);
        source.load().expect("load");
        source.load().expect("load twice");
        assert_eq!(source.alias(), "defaults");
        assert_eq!(source.lookup("port").expect("lookup"), Some(json!(8080)));
    }

    #[test]
    fn set_is_last_write_wins_and_remove_reports() {
        let source = MemorySource::new();
        source.set("k", json!(1));
        source.set("k", json!(2));
        assert_eq!(source.read(), vec![crate::Record::new("k", 2)]);
        assert!(source.remove("k"));
        assert!(!source.remove("k"));
    }
}
