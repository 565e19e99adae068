//! Source contract and the bundled source implementations.
//!
//! Every source keeps its records in a [`RecordStore`], so the accessor half
//! of the contract is provided by default methods; implementations only
//! decide how `load` and `reload` reach their backing store and how lookup
//! keys are shaped for it.

mod env;
mod file;
mod memory;
mod remote;
pub mod store;

pub use env::EnvSource;
pub use file::FileSource;
pub use memory::MemorySource;
pub use remote::{
    CancellationToken, ConsulSource, FetchContext, FetchError, KeyVaultSource, RemoteFetcher,
};
pub use store::{Record, RecordStore, Records};

use crate::{Options, SourceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of backing store behind a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Values held only in process memory.
    #[serde(rename = "MEM")]
    Memory,
    /// Values mirrored from the OS environment.
    #[serde(rename = "OS")]
    OsEnv,
    /// Values read from a configuration file.
    #[serde(rename = "FILE")]
    File,
    /// Secrets fetched from a key vault.
    #[serde(rename = "AZKEYVAULT")]
    KeyVault,
    /// Keys fetched from a Consul KV store.
    #[serde(rename = "CONSUL")]
    Consul,
}

impl SourceType {
    /// Network-backed sources, only queried when remote loading is enabled.
    pub fn is_remote(self) -> bool {
        matches!(self, Self::KeyVault | Self::Consul)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "MEM",
            Self::OsEnv => "OS",
            Self::File => "FILE",
            Self::KeyVault => "AZKEYVAULT",
            Self::Consul => "CONSUL",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single provenance of configuration key/value pairs.
///
/// Accessors are thread-safe; `get_or_set` is one atomic check-then-act and
/// `reload` replaces the record set all at once or not at all.
pub trait Source: Send + Sync + fmt::Debug {
    /// Alias unique within a registry; fixed at construction.
    fn alias(&self) -> &str;

    fn source_type(&self) -> SourceType;

    /// Record store backing this source.
    fn store(&self) -> &RecordStore;

    /// Populate records from the backing store. Calling it again is harmless.
    fn load(&self) -> Result<(), SourceError>;

    /// Re-fetch and replace the records; on failure the previous records stay.
    fn reload(&self) -> Result<(), SourceError>;

    /// Shape a registry lookup key into this source's native key. Keys are
    /// used verbatim unless the source namespaces them (the environment
    /// applies the registry prefix, for instance).
    fn native_key(&self, key: &str, _options: &Options) -> String {
        key.to_string()
    }

    /// Exact-key lookup that can report an unreachable backing store.
    fn lookup(&self, key: &str) -> Result<Option<Value>, SourceError> {
        Ok(self.store().get(key))
    }

    /// ASCII case-insensitive variant of [`Source::lookup`].
    fn lookup_ignore_case(&self, key: &str) -> Result<Option<Value>, SourceError> {
        Ok(self.store().get_ignore_case(key))
    }

    /// Currently loaded keys, in record order.
    fn keys(&self) -> Vec<String> {
        self.store().keys()
    }

    /// Snapshot of every record.
    fn read(&self) -> Vec<Record> {
        self.store().read()
    }

    fn get_or_default(&self, key: &str, default: Value) -> Value {
        self.store().get(key).unwrap_or(default)
    }

    fn get_or_set(&self, key: &str, value: Value) -> Value {
        self.store().get_or_set(key.to_string(), value)
    }

    /// Returns whether a record was removed.
    fn remove(&self, key: &str) -> bool {
        self.store().remove(key)
    }

    fn set(&self, key: &str, value: Value) {
        self.store().set(key.to_string(), value);
    }
}

/// Flatten a JSON document into `segment<sep>segment` keys. Objects are
/// descended into; arrays and scalars become leaf values.
pub(crate) fn flatten_value(value: Value, separator: &str) -> Records {
    let mut records = Records::new();
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(&mut records, key, value, separator);
            }
        }
        Value::Null => {}
        other => records.insert(String::new(), other),
    }
    records
}

fn flatten_into(records: &mut Records, path: String, value: Value, separator: &str) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, value) in map {
                flatten_into(records, format!("{path}{separator}{key}"), value, separator);
            }
        }
        leaf => records.insert(path, leaf),
    }
}
