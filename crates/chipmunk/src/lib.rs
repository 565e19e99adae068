//! Multi-source configuration aggregation.
//!
//! A [`Chipmunk`] registry owns an ordered set of [`Source`]s (memory, OS
//! environment, files, remote stores) and resolves keys across them. Later
//! sources override earlier ones; options control key shaping, strict mode
//! and `${KEY}` expansion. Resolved values can be bound onto typed targets
//! through the [`Bindable`] contract.

pub mod binder;
mod error;
mod options;
pub mod registry;
pub mod source;

/// Public error types returned by sources, resolution and binding.
pub use error::{ChipmunkError, SourceError, ValidationErrors, Violation};
/// Binding contract and field descriptors.
pub use binder::{Bindable, FieldKind, FieldSpec};
/// Registry options.
pub use options::{Options, StructTagOptions};
/// Registry and its builder.
pub use registry::{Chipmunk, ChipmunkBuilder};
/// Source contract and bundled implementations.
pub use source::{
    CancellationToken, ConsulSource, EnvSource, FetchContext, FetchError, FileSource,
    KeyVaultSource, MemorySource, Record, RemoteFetcher, Source, SourceType,
};

/// Value type held by every source.
pub use serde_json::Value;
