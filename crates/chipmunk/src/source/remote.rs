//! Network-backed sources (key vault, Consul).
//!
//! The wire protocol lives in a [`RemoteFetcher`] supplied by the caller.
//! Sources run each fetch on a helper thread and wait for it under the
//! caller's [`FetchContext`]; a deadline or cancellation surfaces as a
//! [`SourceError`] and leaves the previous records in place.

use super::{Record, RecordStore, Records, Source, SourceType};
use crate::options::DEFAULT_NESTED_SEPARATOR;
use crate::{Options, SourceError};
use log::{debug, info, warn};
use serde_json::Value;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Timeout applied by `load`/`reload` when no context is supplied.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// How often a waiting load checks for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Error type returned by fetchers.
pub type FetchError = Box<dyn Error + Send + Sync>;

/// Client for a remote key/value store.
pub trait RemoteFetcher: Send + Sync {
    /// Fetch every entry visible to this source, keyed in the store's native
    /// shape. Long-running fetchers should poll `ctx.cancel`.
    ///
    /// Each call runs on its own helper thread. When the caller stops waiting
    /// (deadline or cancellation) that thread is detached, not joined, and
    /// lives until `fetch` returns; a fetcher that never returns holds one
    /// thread per abandoned load.
    fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Record>, FetchError>;
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation for one remote load.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl FetchContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

/// State shared by every remote source kind.
struct RemoteCore {
    alias: String,
    fetcher: Arc<dyn RemoteFetcher>,
    timeout: Duration,
    loaded: AtomicBool,
    store: RecordStore,
}

impl std::fmt::Debug for RemoteCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCore")
            .field("alias", &self.alias)
            .field("timeout", &self.timeout)
            .field("loaded", &self.loaded.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl RemoteCore {
    fn new(alias: String, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            alias,
            fetcher,
            timeout: DEFAULT_FETCH_TIMEOUT,
            loaded: AtomicBool::new(false),
            store: RecordStore::new(),
        }
    }

    fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Record>, SourceError> {
        if ctx.cancel.is_cancelled() {
            return Err(SourceError::Cancelled {
                alias: self.alias.clone(),
            });
        }

        let (tx, rx) = mpsc::channel();
        let fetcher = Arc::clone(&self.fetcher);
        let worker_ctx = ctx.clone();
        thread::Builder::new()
            .name(format!("chipmunk-fetch-{}", self.alias))
            .spawn(move || {
                // The receiver is gone once the caller gave up waiting.
                let _ = tx.send(fetcher.fetch(&worker_ctx));
            })
            .map_err(|err| SourceError::unavailable(&self.alias, err))?;

        // An unrepresentable deadline means wait until done or cancelled.
        let deadline = Instant::now().checked_add(ctx.timeout);
        loop {
            if ctx.cancel.is_cancelled() {
                warn!("remote fetch cancelled (alias={})", self.alias);
                return Err(SourceError::Cancelled {
                    alias: self.alias.clone(),
                });
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(
                            "remote fetch timed out (alias={}, timeout={:?})",
                            self.alias, ctx.timeout
                        );
                        return Err(SourceError::Timeout {
                            alias: self.alias.clone(),
                            timeout: ctx.timeout,
                        });
                    }
                    (deadline - now).min(CANCEL_POLL_INTERVAL)
                }
                None => CANCEL_POLL_INTERVAL,
            };
            match rx.recv_timeout(wait) {
                Ok(Ok(records)) => return Ok(records),
                Ok(Err(err)) => return Err(SourceError::unavailable(&self.alias, err)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SourceError::unavailable(
                        &self.alias,
                        "fetch worker exited without a result",
                    ));
                }
            }
        }
    }

    fn refresh(
        &self,
        ctx: &FetchContext,
        normalize: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SourceError> {
        let fetched = self.fetch(ctx)?;
        let records: Records = fetched
            .into_iter()
            .filter_map(|record| normalize(&record.key).map(|key| (key, record.value)))
            .collect();
        info!(
            "fetched remote source (alias={}, keys={})",
            self.alias,
            records.len()
        );
        self.store.replace(records);
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_loaded(&self) -> Result<(), SourceError> {
        if self.loaded.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SourceError::unavailable(&self.alias, "not loaded"))
        }
    }
}

/// Lookup keys keep their segments and switch to the `.` separator records
/// are stored under; the registry prefix does not apply to remote stores.
fn remote_native_key(key: &str, options: &Options) -> String {
    if options.nested_separator == DEFAULT_NESTED_SEPARATOR {
        key.to_string()
    } else {
        key.replace(options.nested_separator.as_str(), DEFAULT_NESTED_SEPARATOR)
    }
}

/// Secrets from a key vault. Secret names use `-` between segments, so the
/// secret `database-password` answers `database.password`.
#[derive(Debug)]
pub struct KeyVaultSource {
    core: RemoteCore,
}

impl KeyVaultSource {
    pub fn new(fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            core: RemoteCore::new("keyvault".to_string(), fetcher),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.core.alias = alias.into();
        self
    }

    /// Timeout used by `load`/`reload`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.core.timeout = timeout;
        self
    }

    /// Load under a caller-supplied deadline and cancellation token.
    pub fn load_with(&self, ctx: &FetchContext) -> Result<(), SourceError> {
        self.core.refresh(ctx, |name| {
            Some(name.replace('-', DEFAULT_NESTED_SEPARATOR))
        })
    }

    pub fn reload_with(&self, ctx: &FetchContext) -> Result<(), SourceError> {
        debug!("reloading key vault source (alias={})", self.core.alias);
        self.load_with(ctx)
    }
}

impl Source for KeyVaultSource {
    fn alias(&self) -> &str {
        &self.core.alias
    }

    fn source_type(&self) -> SourceType {
        SourceType::KeyVault
    }

    fn store(&self) -> &RecordStore {
        &self.core.store
    }

    fn load(&self) -> Result<(), SourceError> {
        self.load_with(&FetchContext::new(self.core.timeout))
    }

    fn reload(&self) -> Result<(), SourceError> {
        self.reload_with(&FetchContext::new(self.core.timeout))
    }

    fn native_key(&self, key: &str, options: &Options) -> String {
        remote_native_key(key, options)
    }

    fn lookup(&self, key: &str) -> Result<Option<Value>, SourceError> {
        self.core.ensure_loaded()?;
        Ok(self.core.store.get(key))
    }

    fn lookup_ignore_case(&self, key: &str) -> Result<Option<Value>, SourceError> {
        self.core.ensure_loaded()?;
        Ok(self.core.store.get_ignore_case(key))
    }
}

/// Keys from a Consul KV tree. Paths below `key_prefix` become keys with `/`
/// replaced by `.`; entries outside the prefix are dropped.
#[derive(Debug)]
pub struct ConsulSource {
    core: RemoteCore,
    key_prefix: String,
}

impl ConsulSource {
    pub fn new(fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            core: RemoteCore::new("consul".to_string(), fetcher),
            key_prefix: String::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.core.alias = alias.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.core.timeout = timeout;
        self
    }

    /// KV path the source is rooted at, e.g. `services/api/`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn load_with(&self, ctx: &FetchContext) -> Result<(), SourceError> {
        let prefix = self.key_prefix.as_str();
        self.core.refresh(ctx, |path| {
            let relative = path.strip_prefix(prefix)?.trim_matches('/');
            if relative.is_empty() {
                return None;
            }
            Some(relative.replace('/', DEFAULT_NESTED_SEPARATOR))
        })
    }

    pub fn reload_with(&self, ctx: &FetchContext) -> Result<(), SourceError> {
        debug!("reloading consul source (alias={})", self.core.alias);
        self.load_with(ctx)
    }
}

impl Source for ConsulSource {
    fn alias(&self) -> &str {
        &self.core.alias
    }

    fn source_type(&self) -> SourceType {
        SourceType::Consul
    }

    fn store(&self) -> &RecordStore {
        &self.core.store
    }

    fn load(&self) -> Result<(), SourceError> {
        self.load_with(&FetchContext::new(self.core.timeout))
    }

    fn reload(&self) -> Result<(), SourceError> {
        self.reload_with(&FetchContext::new(self.core.timeout))
    }

    fn native_key(&self, key: &str, options: &Options) -> String {
        remote_native_key(key, options)
    }

    fn lookup(&self, key: &str) -> Result<Option<Value>, SourceError> {
        self.core.ensure_loaded()?;
        Ok(self.core.store.get(key))
    }

    fn lookup_ignore_case(&self, key: &str) -> Result<Option<Value>, SourceError> {
        self.core.ensure_loaded()?;
        Ok(self.core.store.get_ignore_case(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixed(Vec<Record>);

    impl RemoteFetcher for Fixed {
        fn fetch(&self, _ctx: &FetchContext) -> Result<Vec<Record>, FetchError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn lookup_before_load_is_unavailable() {
        let source = KeyVaultSource::new(Arc::new(Fixed(Vec::new())));
        let err = source.lookup("anything").unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn key_vault_names_map_to_nested_keys() {
        let source = KeyVaultSource::new(Arc::new(Fixed(vec![Record::new(
            "database-password",
            "s3cret",
        )])));
        source.load().expect("load");
        assert_eq!(
            source.lookup("database.password").expect("lookup"),
            Some(json!("s3cret"))
        );
    }

    #[test]
    fn consul_strips_prefix_and_drops_foreign_paths() {
        let source = ConsulSource::new(Arc::new(Fixed(vec![
            Record::new("services/api/db/host", "db.internal"),
            Record::new("services/api/", ""),
            Record::new("services/web/port", "80"),
        ])))
        .with_key_prefix("services/api/");
        source.load().expect("load");
        assert_eq!(source.keys(), vec!["db.host".to_string()]);
    }

    #[test]
    fn pre_cancelled_context_never_fetches() {
        let source = ConsulSource::new(Arc::new(Fixed(Vec::new())));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = FetchContext::default().with_cancel(cancel);
        let err = source.load_with(&ctx).unwrap_err();
        assert!(matches!(err, SourceError::Cancelled { .. }));
    }
}
