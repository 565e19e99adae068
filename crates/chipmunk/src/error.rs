//! Error types for sources, resolution and binding.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single source while loading or answering lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The backing store could not be read.
    #[error("source '{alias}' unavailable: {reason}")]
    Unavailable { alias: String, reason: String },
    /// A remote fetch did not finish before its deadline.
    #[error("source '{alias}' timed out after {timeout:?}")]
    Timeout { alias: String, timeout: Duration },
    /// A remote fetch was cancelled by the caller.
    #[error("source '{alias}' load cancelled")]
    Cancelled { alias: String },
}

impl SourceError {
    pub(crate) fn unavailable(alias: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Unavailable {
            alias: alias.into(),
            reason: reason.to_string(),
        }
    }

    /// Alias of the source that failed.
    pub fn alias(&self) -> &str {
        match self {
            Self::Unavailable { alias, .. }
            | Self::Timeout { alias, .. }
            | Self::Cancelled { alias } => alias,
        }
    }
}

/// A single field that failed to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation collected during one bind pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<Violation>,
}

impl ValidationErrors {
    pub(crate) fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Violation recorded for a field, if any.
    pub fn field(&self, field: &str) -> Option<&Violation> {
        self.violations.iter().find(|violation| violation.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, violation) in self.violations.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Errors returned by the registry.
#[derive(Debug, Error)]
pub enum ChipmunkError {
    /// A source could not reach its backing store.
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
    /// Strict-mode lookup of a key that no source defines.
    #[error("key not found: {key}")]
    KeyNotFound { key: String },
    /// Variable expansion looped back onto a key already being resolved.
    #[error("circular reference: {}", .chain.join(" -> "))]
    CircularReference { chain: Vec<String> },
    /// One or more fields failed to bind.
    #[error("validation failed ({count} violations): {0}", count = .0.len())]
    ValidationError(ValidationErrors),
    /// Two sources registered under the same alias.
    #[error("duplicate source alias: {0}")]
    DuplicateAlias(String),
    /// Options failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// Reading an options file failed.
    #[error("failed to read options: {0}")]
    ReadFailed(#[from] std::io::Error),
    /// Parsing an options file failed.
    #[error("failed to parse options: {0}")]
    ParseFailed(#[from] json5::Error),
}
