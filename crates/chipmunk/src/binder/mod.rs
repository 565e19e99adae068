//! Binding resolved keys onto typed targets.
//!
//! Rust has no struct tags to reflect over, so a target lists its bindable
//! fields through [`Bindable::fields`]. Each field is resolved through the
//! registry, coerced to its declared [`FieldKind`], and placed into a JSON
//! object (dotted names become nested objects) that serde then decodes into
//! the target. Every failing field is reported together in one
//! [`ChipmunkError::ValidationError`].

mod coerce;


pub use coerce::FieldKind;

use crate::registry::{Chipmunk, value_to_text};
use crate::{ChipmunkError, StructTagOptions, ValidationErrors, Violation};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;

/// Field name used for violations raised by the final decode step.
const TARGET_FIELD: &str = "$target";

/// A structure that can be populated from a registry.
pub trait Bindable: DeserializeOwned {
    /// Bindable fields and their directives.
    fn fields() -> Vec<FieldSpec>;
}

/// Binding directives for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Path of the field in the target, segments joined by the registry's
    /// nested separator.
    pub name: String,
    /// Key to resolve instead of `name`.
    pub alias: Option<String>,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
    /// Expand `${KEY}` placeholders even when the registry does not.
    pub expand: bool,
    /// The resolved value is a path; the file's contents are the value.
    pub file: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            alias: None,
            kind,
            required: false,
            default: None,
            expand: false,
            file: false,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn expand(mut self) -> Self {
        self.expand = true;
        self
    }

    pub fn file(mut self) -> Self {
        self.file = true;
        self
    }

    /// Registry key for this field. A registry-wide alias acts as a
    /// namespace for fields without their own alias.
    fn key(&self, tags: &StructTagOptions, nested_separator: &str) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &tags.alias {
            Some(namespace) if !namespace.is_empty() => {
                format!("{namespace}{nested_separator}{}", self.name)
            }
            _ => self.name.clone(),
        }
    }
}

impl Chipmunk {
    /// Build a new target from the registry's resolved values.
    pub fn bind<T: Bindable>(&self) -> Result<T, ChipmunkError> {
        let fields = T::fields();
        let nested_separator = self.options().nested_separator.clone();
        let mut violations = ValidationErrors::default();
        let mut root = Map::new();
        // Fields without a value, and which of those were simply unset.
        let mut unfilled = Vec::new();
        let mut unset = Vec::new();

        for field in &fields {
            match self.bind_field(field) {
                Ok(Some(value)) => {
                    insert_nested(&mut root, &field.name, &nested_separator, value);
                }
                Ok(None) => {
                    debug!("field left unset (field={})", field.name);
                    unfilled.push(field);
                    unset.push(field);
                }
                Err(violation) => {
                    violations.push(violation);
                    unfilled.push(field);
                }
            }
        }

        match serde_json::from_value::<T>(Value::Object(root.clone())) {
            Ok(target) if violations.is_empty() => {
                info!("bind complete (fields={})", fields.len());
                return Ok(target);
            }
            Ok(_) => {}
            Err(err) => {
                let decode = Decode {
                    root: &root,
                    unfilled: &unfilled,
                    separator: &nested_separator,
                };
                decode.explain::<T>(&unset, err, &mut violations);
            }
        }

        info!(
            "bind failed (fields={}, violations={})",
            fields.len(),
            violations.len()
        );
        Err(ChipmunkError::ValidationError(violations))
    }

    /// Bind onto an existing target; it is only replaced when every field
    /// binds.
    pub fn bind_into<T: Bindable>(&self, target: &mut T) -> Result<(), ChipmunkError> {
        *target = self.bind()?;
        Ok(())
    }

    fn bind_field(&self, field: &FieldSpec) -> Result<Option<Value>, Violation> {
        let options = self.options();
        let tags = &options.tag_options;
        let key = field.key(tags, &options.nested_separator);
        let expand = options.variable_expansion || field.expand || tags.expand;

        let resolved = self
            .resolve_with(&key, expand)
            .map_err(|err| Violation::new(&field.name, err.to_string()))?;

        let value = match resolved {
            Some(value) if field.file || tags.file => Some(read_value_file(field, value)?),
            Some(value) => Some(value),
            None => field
                .default
                .clone()
                .or_else(|| tags.default.then(|| field.kind.zero_value())),
        };

        let Some(value) = value else {
            let required = field.required || tags.required;
            if required && (tags.validation || options.strict_mode) {
                return Err(Violation::new(
                    &field.name,
                    format!("required key '{key}' is not set"),
                ));
            }
            if options.strict_mode {
                return Err(Violation::new(&field.name, format!("key not found: {key}")));
            }
            return Ok(None);
        };

        field
            .kind
            .coerce(value)
            .map(Some)
            .map_err(|message| Violation::new(&field.name, message))
    }
}

/// Attributes a failed decode to the fields that caused it.
struct Decode<'a> {
    root: &'a Map<String, Value>,
    unfilled: &'a [&'a FieldSpec],
    separator: &'a str,
}

impl Decode<'_> {
    /// Adds one violation per unset field the target cannot do without. A
    /// failure no single field explains is reported against the target.
    fn explain<T: DeserializeOwned>(
        &self,
        unset: &[&FieldSpec],
        err: serde_json::Error,
        violations: &mut ValidationErrors,
    ) {
        if let Err(err) = serde_json::from_value::<T>(self.filled_except(None)) {
            violations.push(Violation::new(TARGET_FIELD, err.to_string()));
            return;
        }
        for field in unset {
            if serde_json::from_value::<T>(self.filled_except(Some(&field.name))).is_err() {
                violations.push(Violation::new(
                    &field.name,
                    "not set and the target has no default for it",
                ));
            }
        }
        if violations.is_empty() {
            violations.push(Violation::new(TARGET_FIELD, err.to_string()));
        }
    }

    /// The bound values with every unfilled field but `skip` at its zero value.
    fn filled_except(&self, skip: Option<&str>) -> Value {
        let mut filled = self.root.clone();
        for field in self.unfilled {
            if skip != Some(field.name.as_str()) {
                insert_nested(&mut filled, &field.name, self.separator, field.kind.zero_value());
            }
        }
        Value::Object(filled)
    }
}

fn read_value_file(field: &FieldSpec, value: Value) -> Result<Value, Violation> {
    let path = value_to_text(value);
    let contents = fs::read_to_string(&path)
        .map_err(|err| Violation::new(&field.name, format!("failed to read {path}: {err}")))?;
    Ok(Value::String(contents.trim_end_matches(['\r', '\n']).to_string()))
}

fn insert_nested(root: &mut Map<String, Value>, name: &str, separator: &str, value: Value) {
    let mut segments: Vec<&str> = name.split(separator).collect();
    let last = segments.pop().unwrap_or(name);
    let mut current = root;
    for segment in segments {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Some(next) = slot.as_object_mut() else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}
