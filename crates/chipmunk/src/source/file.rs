//! Source backed by a JSON5 document on disk.

use super::{RecordStore, Records, Source, SourceType, flatten_value};
use crate::options::DEFAULT_NESTED_SEPARATOR;
use crate::{Options, SourceError};
use log::{debug, info};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Nested objects in the file are flattened into `a.b.c` keys. Lookup keys
/// are used as-is; the registry prefix does not apply to files.
#[derive(Debug)]
pub struct FileSource {
    alias: String,
    path: PathBuf,
    nested_separator: String,
    optional: bool,
    store: RecordStore,
}

impl FileSource {
    /// Source aliased after the file name.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let alias = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Self {
            alias,
            path,
            nested_separator: DEFAULT_NESTED_SEPARATOR.to_string(),
            optional: false,
            store: RecordStore::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Separator used when flattening nested objects.
    pub fn with_nested_separator(mut self, separator: impl Into<String>) -> Self {
        self.nested_separator = separator.into();
        self
    }

    /// A missing file loads as an empty record set instead of failing.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> Result<Records, SourceError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound && self.optional => {
                debug!(
                    "optional file missing (alias={}, path={})",
                    self.alias,
                    self.path.display()
                );
                return Ok(Records::new());
            }
            Err(err) => {
                return Err(SourceError::unavailable(
                    &self.alias,
                    format!("{}: {err}", self.path.display()),
                ));
            }
        };
        let value: Value = json5::from_str(&contents).map_err(|err| {
            SourceError::unavailable(&self.alias, format!("{}: {err}", self.path.display()))
        })?;
        Ok(flatten_value(value, &self.nested_separator))
    }
}

impl Source for FileSource {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn source_type(&self) -> SourceType {
        SourceType::File
    }

    fn store(&self) -> &RecordStore {
        &self.store
    }

    fn load(&self) -> Result<(), SourceError> {
        let records = self.read_records()?;
        info!(
            "loaded file source (alias={}, path={}, keys={})",
            self.alias,
            self.path.display(),
            records.len()
        );
        self.store.replace(records);
        Ok(())
    }

    fn reload(&self) -> Result<(), SourceError> {
        let records = self.read_records()?;
        debug!(
            "reloaded file source (alias={}, keys={})",
            self.alias,
            records.len()
        );
        self.store.replace(records);
        Ok(())
    }

    fn native_key(&self, key: &str, options: &Options) -> String {
        if options.nested_separator == self.nested_separator {
            key.to_string()
        } else {
            key.replace(options.nested_separator.as_str(), &self.nested_separator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn loads_and_flattens_json5() {
        let temp = TempDir::new().expect("tmp");
        let path = temp.path().join("app.json5");
        fs::write(&path, "{ server: { port: 8080 }, name: 'svc', }").expect("write");

        let source = FileSource::new(&path);
        assert_eq!(source.alias(), "app.json5");
        source.load().expect("load");
        assert_eq!(source.lookup("server.port").expect("lookup"), Some(json!(8080)));
        assert_eq!(source.lookup("name").expect("lookup"), Some(json!("svc")));
    }

    #[test]
    fn missing_file_is_unavailable_unless_optional() {
        let temp = TempDir::new().expect("tmp");
        let path = temp.path().join("absent.json5");

        let err = FileSource::new(&path).load().unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));

        let optional = FileSource::new(&path).optional();
        optional.load().expect("optional load");
        assert!(optional.keys().is_empty());
    }

    #[test]
    fn failed_reload_keeps_previous_records() {
        let temp = TempDir::new().expect("tmp");
        let path = temp.path().join("app.json5");
        fs::write(&path, "{ x: 1 }").expect("write");
        let source = FileSource::new(&path);
        source.load().expect("load");

        fs::write(&path, "{ x: ").expect("corrupt");
        assert!(source.reload().is_err());
        assert_eq!(source.lookup("x").expect("lookup"), Some(json!(1)));

        fs::write(&path, "{ x: 2 }").expect("rewrite");
        source.reload().expect("reload");
        assert_eq!(source.lookup("x").expect("lookup"), Some(json!(2)));
    }

    #[test]
    fn native_key_maps_registry_separator() {
        let source = FileSource::new("cfg.json5").with_nested_separator("/");
        let options = Options {
            prefix: "APP".to_string(),
            ..Options::default()
        };
        assert_eq!(source.native_key("db.host", &options), "db/host");
    }
}
