//! Builder assembling an immutable [`Chipmunk`].

use super::Chipmunk;
use crate::source::{EnvSource, MemorySource, Source};
use crate::{ChipmunkError, Options, StructTagOptions};
use log::info;
use std::collections::HashSet;

/// Collects sources and options; every setter applies immediately to the
/// builder and hands it back for chaining.
#[derive(Debug, Default)]
pub struct ChipmunkBuilder {
    options: Options,
    sources: Vec<Box<dyn Source>>,
}

impl ChipmunkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all options at once.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = prefix.into();
        self
    }

    /// Append sources; later sources override earlier ones.
    pub fn with_sources<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Source>>,
    {
        self.sources.extend(sources);
        self
    }

    pub fn with_source(mut self, source: impl Source + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// An empty memory source for defaults followed by the process
    /// environment.
    pub fn with_default_sources(self) -> Self {
        self.with_source(MemorySource::new()).with_source(EnvSource::new())
    }

    /// Enforce required fields when binding.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.options.tag_options.validation = enabled;
        self
    }

    pub fn with_case_sensitive(mut self, enabled: bool) -> Self {
        self.options.case_sensitive = enabled;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.options.separator = separator.into();
        self
    }

    pub fn with_nested_separator(mut self, separator: impl Into<String>) -> Self {
        self.options.nested_separator = separator.into();
        self
    }

    pub fn with_tag_options(mut self, tag_options: StructTagOptions) -> Self {
        self.options.tag_options = tag_options;
        self
    }

    pub fn with_strict_mode(mut self, enabled: bool) -> Self {
        self.options.strict_mode = enabled;
        self
    }

    pub fn with_variable_expansion(mut self, enabled: bool) -> Self {
        self.options.variable_expansion = enabled;
        self
    }

    pub fn with_remote_loading(mut self, enabled: bool) -> Self {
        self.options.remote_loading = enabled;
        self
    }

    /// Precedence weight for a source alias; higher weights override lower
    /// ones, equal weights keep registration order.
    pub fn with_weight(mut self, alias: impl Into<String>, weight: i32) -> Self {
        self.options.weights.insert(alias.into(), weight);
        self
    }

    /// Validate options and source aliases and freeze the registry.
    pub fn build(self) -> Result<Chipmunk, ChipmunkError> {
        self.options.validate()?;
        let mut aliases = HashSet::new();
        for source in &self.sources {
            if !aliases.insert(source.alias()) {
                return Err(ChipmunkError::DuplicateAlias(source.alias().to_string()));
            }
        }
        info!(
            "registry built (sources={}, prefix={:?}, strict={}, expansion={}, remote={})",
            self.sources.len(),
            self.options.prefix,
            self.options.strict_mode,
            self.options.variable_expansion,
            self.options.remote_loading
        );
        Ok(Chipmunk::from_parts(self.options, self.sources))
    }
}
