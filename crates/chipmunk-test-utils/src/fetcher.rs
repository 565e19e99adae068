use chipmunk::{FetchContext, FetchError, Record, RemoteFetcher};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Returns whatever records it currently holds; tests swap them between
/// reloads or make the next fetch fail.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    records: Mutex<Vec<Record>>,
    fail_next: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new<K, V, I>(entries: I) -> Arc<Self>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let fetcher = Self::default();
        fetcher.set_entries(entries);
        Arc::new(fetcher)
    }

    pub fn set_entries<K, V, I>(&self, entries: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        *self.records.lock() = entries
            .into_iter()
            .map(|(key, value)| Record::new(key, value))
            .collect();
    }

    pub fn fail_next(&self, reason: impl Into<String>) {
        *self.fail_next.lock() = Some(reason.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteFetcher for ScriptedFetcher {
    fn fetch(&self, _ctx: &FetchContext) -> Result<Vec<Record>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.fail_next.lock().take() {
            return Err(reason.into());
        }
        Ok(self.records.lock().clone())
    }
}

/// Always fails, as an unreachable store would.
#[derive(Debug, Clone)]
pub struct FailingFetcher {
    reason: String,
}

impl FailingFetcher {
    pub fn new(reason: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reason: reason.into(),
        })
    }
}

impl RemoteFetcher for FailingFetcher {
    fn fetch(&self, _ctx: &FetchContext) -> Result<Vec<Record>, FetchError> {
        Err(self.reason.clone().into())
    }
}

/// Blocks for `delay` (or until cancelled) before returning no records.
#[derive(Debug, Clone)]
pub struct SlowFetcher {
    delay: Duration,
}

impl SlowFetcher {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay })
    }
}

impl RemoteFetcher for SlowFetcher {
    fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Record>, FetchError> {
        let deadline = Instant::now() + self.delay;
        while Instant::now() < deadline {
            if ctx.cancel.is_cancelled() {
                return Err("cancelled".into());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(Vec::new())
    }
}
