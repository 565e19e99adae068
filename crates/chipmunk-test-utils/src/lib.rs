//! Test helpers shared across Chipmunk crates.

pub mod env;
pub mod fetcher;

pub use env::EnvGuard;
pub use fetcher::{FailingFetcher, ScriptedFetcher, SlowFetcher};
