//! Source registry and key resolution.
//!
//! A [`Chipmunk`] is assembled once through [`ChipmunkBuilder`] and is
//! read-only afterwards; sources synchronize their own records, so a built
//! registry can be shared across threads behind an `Arc`.
//!
//! Precedence (low -> high): registration order, stably re-sorted by the
//! per-alias weights in [`Options::weights`]. Later sources override earlier
//! ones.

mod builder;
mod expand;
mod merge;


pub use builder::ChipmunkBuilder;

use crate::source::Source;
use crate::{ChipmunkError, Options};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Ordered set of sources plus the options used to resolve keys across them.
#[derive(Debug)]
pub struct Chipmunk {
    options: Options,
    sources: Vec<Box<dyn Source>>,
    /// Indices into `sources`, lowest precedence first.
    order: Vec<usize>,
}

impl Chipmunk {
    /// Start configuring a registry.
    pub fn builder() -> ChipmunkBuilder {
        ChipmunkBuilder::new()
    }

    pub(crate) fn from_parts(options: Options, sources: Vec<Box<dyn Source>>) -> Self {
        let mut order: Vec<usize> = (0..sources.len()).collect();
        order.sort_by_key(|&idx| options.weight(sources[idx].alias()));
        Self {
            options,
            sources,
            order,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Sources in registration order.
    pub fn sources(&self) -> impl Iterator<Item = &dyn Source> {
        self.sources.iter().map(|source| source.as_ref())
    }

    pub fn source(&self, alias: &str) -> Option<&dyn Source> {
        self.sources().find(|source| source.alias() == alias)
    }

    /// Sources consulted during resolution, lowest precedence first. Remote
    /// sources are left out unless remote loading is enabled.
    pub(crate) fn active_sources(&self) -> impl Iterator<Item = &dyn Source> {
        let remote_loading = self.options.remote_loading;
        self.order
            .iter()
            .map(|&idx| self.sources[idx].as_ref())
            .filter(move |source| remote_loading || !source.source_type().is_remote())
    }

    /// Load every active source.
    ///
    /// In strict mode the first failure is returned; otherwise failures are
    /// logged and the remaining sources still load.
    pub fn load(&self) -> Result<(), ChipmunkError> {
        self.for_each_active("load", |source| source.load())
    }

    /// Reload every active source. Failed sources keep their records.
    pub fn reload(&self) -> Result<(), ChipmunkError> {
        self.for_each_active("reload", |source| source.reload())
    }

    fn for_each_active(
        &self,
        action: &str,
        mut run: impl FnMut(&dyn Source) -> Result<(), crate::SourceError>,
    ) -> Result<(), ChipmunkError> {
        let mut failed = 0usize;
        for source in self.sources() {
            if source.source_type().is_remote() && !self.options.remote_loading {
                debug!(
                    "remote loading disabled; skipping {action} (alias={})",
                    source.alias()
                );
                continue;
            }
            if let Err(err) = run(source) {
                if self.options.strict_mode {
                    return Err(err.into());
                }
                warn!("source {action} failed (alias={}): {err}", source.alias());
                failed += 1;
            }
        }
        info!(
            "sources {action} complete (sources={}, failed={failed})",
            self.sources.len()
        );
        Ok(())
    }

    /// Resolve a key across all sources.
    ///
    /// Returns `Ok(None)` when no source defines the key, unless strict mode
    /// is on, in which case the miss is `KeyNotFound`.
    pub fn resolve(&self, key: &str) -> Result<Option<Value>, ChipmunkError> {
        let resolved = self.resolve_with(key, self.options.variable_expansion)?;
        if resolved.is_none() && self.options.strict_mode {
            return Err(ChipmunkError::KeyNotFound {
                key: key.to_string(),
            });
        }
        Ok(resolved)
    }

    /// Resolve a key that must exist, regardless of strict mode.
    pub fn resolve_strict(&self, key: &str) -> Result<Value, ChipmunkError> {
        self.resolve(key)?.ok_or_else(|| ChipmunkError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// Resolve a key as text; non-string values use their JSON form.
    pub fn resolve_string(&self, key: &str) -> Result<Option<String>, ChipmunkError> {
        Ok(self.resolve(key)?.map(value_to_text))
    }

    /// Resolution without the strict-mode miss check, with expansion chosen
    /// by the caller.
    pub(crate) fn resolve_with(
        &self,
        key: &str,
        expand: bool,
    ) -> Result<Option<Value>, ChipmunkError> {
        if expand {
            expand::Expander::new(self).resolve(key)
        } else {
            merge::resolve_raw(self, key)
        }
    }

    /// Union of the loaded keys of every active source, in first-seen order.
    pub fn keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for source in self.active_sources() {
            for key in source.keys() {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Flat view of every record, higher-precedence sources overriding lower
    /// ones on identical native keys.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let mut merged = BTreeMap::new();
        for source in self.active_sources() {
            for record in source.read() {
                merged.insert(record.key, record.value);
            }
        }
        merged
    }
}

/// Text form of a value: strings verbatim, everything else as JSON.
pub(crate) fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
