//! Registry options and their JSON5 loading.

use crate::ChipmunkError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Default separator between prefix and key.
pub(crate) const DEFAULT_SEPARATOR: &str = "_";
/// Default separator between nested key segments.
pub(crate) const DEFAULT_NESTED_SEPARATOR: &str = ".";

/// Resolution options shared by every source in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Prepended to lookup keys (joined with `separator`).
    pub prefix: String,
    /// Compare keys byte-for-byte instead of ASCII case-folded.
    pub case_sensitive: bool,
    /// Joins the prefix to the key.
    pub separator: String,
    /// Joins nested key segments (`database.host`).
    pub nested_separator: String,
    /// Registry-wide binding defaults.
    pub tag_options: StructTagOptions,
    /// Missing keys fail with `KeyNotFound` and source errors propagate.
    pub strict_mode: bool,
    /// Resolve `${KEY}` placeholders in string values.
    pub variable_expansion: bool,
    /// Query remote-backed sources (key vault, consul).
    pub remote_loading: bool,
    /// Precedence weights by source alias; higher weights override lower.
    pub weights: BTreeMap<String, i32>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            case_sensitive: false,
            separator: DEFAULT_SEPARATOR.to_string(),
            nested_separator: DEFAULT_NESTED_SEPARATOR.to_string(),
            tag_options: StructTagOptions::default(),
            strict_mode: false,
            variable_expansion: false,
            remote_loading: false,
            weights: BTreeMap::new(),
        }
    }
}

/// Binding defaults applied to every field unless the field overrides them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StructTagOptions {
    /// Key used for a field when it declares no alias of its own.
    pub alias: Option<String>,
    /// Enforce `required` fields.
    pub validation: bool,
    /// Treat every field as required.
    pub required: bool,
    /// Fill unresolved fields with their kind's zero value.
    pub default: bool,
    /// Expand `${KEY}` placeholders in bound values.
    pub expand: bool,
    /// Treat resolved values as paths whose contents are the value.
    pub file: bool,
}

impl Options {
    /// Load options from a JSON5 file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ChipmunkError> {
        info!("loading options from path: {}", path.as_ref().display());
        let contents = fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    /// Load options from JSON5 contents.
    pub fn load_from_str(contents: &str) -> Result<Self, ChipmunkError> {
        debug!("loading options from raw contents (len={})", contents.len());
        let options: Options = json5::from_str(contents)?;
        options.validate()?;
        Ok(options)
    }

    /// Validate invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ChipmunkError> {
        if self.separator.is_empty() {
            return Err(ChipmunkError::InvalidOptions(
                "separator must not be empty".to_string(),
            ));
        }
        if self.nested_separator.is_empty() {
            return Err(ChipmunkError::InvalidOptions(
                "nested_separator must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Join the prefix onto a key, if a prefix is set.
    pub fn qualify(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", self.prefix, self.separator, key)
        }
    }

    /// Precedence weight for a source alias.
    pub fn weight(&self, alias: &str) -> i32 {
        self.weights.get(alias).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_yields_defaults() {
        let options = Options::load_from_str("{}").expect("options");
        assert_eq!(options, Options::default());
        assert_eq!(options.separator, "_");
        assert_eq!(options.nested_separator, ".");
    }

    #[test]
    fn parses_json5_fields() {
        let options = Options::load_from_str(
            r#"{
                prefix: "APP",
                strict_mode: true,
                tag_options: { validation: true },
                weights: { env: 10 },
            }"#,
        )
        .expect("options");
        assert_eq!(options.prefix, "APP");
        assert!(options.strict_mode);
        assert!(options.tag_options.validation);
        assert_eq!(options.weight("env"), 10);
        assert_eq!(options.weight("memory"), 0);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = Options::load_from_str("{ unexpected: true }").unwrap_err();
        assert!(matches!(err, ChipmunkError::ParseFailed(_)));
    }

    #[test]
    fn rejects_empty_separator() {
        let err = Options::load_from_str(r#"{ separator: "" }"#).unwrap_err();
        assert!(format!("{err}").contains("separator"));
    }

    #[test]
    fn qualify_only_prefixes_when_set() {
        let mut options = Options::default();
        assert_eq!(options.qualify("port"), "port");
        options.prefix = "APP".to_string();
        assert_eq!(options.qualify("port"), "APP_port");
    }
}
