//! Source mirroring the OS environment.

use super::{RecordStore, Records, Source, SourceType};
use crate::{Options, SourceError};
use log::{debug, info};
use serde_json::Value;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default alias for environment sources.
const DEFAULT_ALIAS: &str = "env";

/// Environment variables as string values.
///
/// Lookup keys are shaped as `PREFIX<sep>SEGMENT<sep>SEGMENT` in upper case,
/// so `database.host` under prefix `app` reads `APP_DATABASE_HOST`.
#[derive(Debug)]
pub struct EnvSource {
    alias: String,
    name_prefix: Option<String>,
    read_from_os: bool,
    /// Seeded by `from_vars`; never captures the process environment.
    fixed: bool,
    loaded: AtomicBool,
    store: RecordStore,
}

impl EnvSource {
    /// Mirror the whole process environment.
    pub fn new() -> Self {
        Self {
            alias: DEFAULT_ALIAS.to_string(),
            name_prefix: None,
            read_from_os: true,
            fixed: false,
            loaded: AtomicBool::new(false),
            store: RecordStore::new(),
        }
    }

    /// Fixed variables that never touch the process environment.
    pub fn from_vars<K, V, I>(vars: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let records: Records = vars
            .into_iter()
            .map(|(key, value)| (key.into(), Value::String(value.into())))
            .collect();
        Self {
            alias: DEFAULT_ALIAS.to_string(),
            name_prefix: None,
            read_from_os: false,
            fixed: true,
            loaded: AtomicBool::new(true),
            store: RecordStore::from_records(records),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Only mirror variables whose names start with `prefix`.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// When false, `reload` keeps the records captured by `load` instead of
    /// re-reading the environment. `load` always captures.
    pub fn with_read_from_os(mut self, read_from_os: bool) -> Self {
        self.read_from_os = read_from_os;
        self
    }

    pub fn reads_from_os(&self) -> bool {
        self.read_from_os
    }

    fn capture(&self) -> Records {
        let mut records = Records::new();
        for (name, value) in env::vars_os() {
            let (Some(name), Some(value)) = (name.to_str(), value.to_str()) else {
                debug!("skipping non-unicode environment variable (alias={})", self.alias);
                continue;
            };
            if let Some(prefix) = &self.name_prefix {
                if !name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            records.insert(name.to_string(), Value::String(value.to_string()));
        }
        records
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Source for EnvSource {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn source_type(&self) -> SourceType {
        SourceType::OsEnv
    }

    fn store(&self) -> &RecordStore {
        &self.store
    }

    fn load(&self) -> Result<(), SourceError> {
        if self.fixed {
            return Ok(());
        }
        let records = self.capture();
        info!(
            "loaded environment source (alias={}, vars={})",
            self.alias,
            records.len()
        );
        self.store.replace(records);
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn reload(&self) -> Result<(), SourceError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return self.load();
        }
        if self.fixed || !self.read_from_os {
            debug!("environment reload skipped (alias={})", self.alias);
            return Ok(());
        }
        let records = self.capture();
        debug!(
            "reloaded environment source (alias={}, vars={})",
            self.alias,
            records.len()
        );
        self.store.replace(records);
        Ok(())
    }

    fn native_key(&self, key: &str, options: &Options) -> String {
        let key = key.replace(options.nested_separator.as_str(), &options.separator);
        options.qualify(&key).to_ascii_uppercase()
    }
}
