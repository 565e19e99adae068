//! Tests for remote-backed sources and the remote-loading switch.

use chipmunk::{
    CancellationToken, Chipmunk, ChipmunkError, ConsulSource, FetchContext, KeyVaultSource,
    MemorySource, Source, SourceError,
};
use chipmunk_test_utils::{FailingFetcher, ScriptedFetcher, SlowFetcher};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::thread;
use std::time::{Duration, Instant};

/// Remote sources are ignored entirely unless remote loading is enabled.
#[test]
fn remote_sources_require_remote_loading() {
    let fetcher = ScriptedFetcher::new([("db-password", "s3cret")]);

    let offline = Chipmunk::builder()
        .with_source(KeyVaultSource::new(fetcher.clone()))
        .build()
        .expect("registry");
    offline.load().expect("load");
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(offline.resolve("db.password").expect("resolve"), None);

    let online = Chipmunk::builder()
        .with_source(KeyVaultSource::new(fetcher.clone()))
        .with_remote_loading(true)
        .build()
        .expect("registry");
    online.load().expect("load");
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(
        online.resolve("db.password").expect("resolve"),
        Some(json!("s3cret"))
    );
}

/// Non-strict lookups skip an unreachable remote; strict lookups surface it.
#[test]
fn unavailable_remote_is_swallowed_only_when_lenient() {
    let lenient = Chipmunk::builder()
        .with_source(MemorySource::new().with_values([("region", "eu")]))
        .with_source(ConsulSource::new(FailingFetcher::new("connection refused")))
        .with_remote_loading(true)
        .build()
        .expect("registry");
    lenient.load().expect("lenient load");
    assert_eq!(lenient.resolve("region").expect("resolve"), Some(json!("eu")));

    let strict = Chipmunk::builder()
        .with_source(MemorySource::new().with_values([("region", "eu")]))
        .with_source(ConsulSource::new(FailingFetcher::new("connection refused")))
        .with_remote_loading(true)
        .with_strict_mode(true)
        .build()
        .expect("registry");
    assert!(matches!(
        strict.load(),
        Err(ChipmunkError::SourceUnavailable(SourceError::Unavailable { .. }))
    ));
    assert!(matches!(
        strict.resolve("region"),
        Err(ChipmunkError::SourceUnavailable(_))
    ));
}

#[test]
fn slow_fetch_times_out() {
    let source = KeyVaultSource::new(SlowFetcher::new(Duration::from_secs(5)))
        .with_timeout(Duration::from_millis(50));
    let started = Instant::now();
    let err = source.load().unwrap_err();
    assert!(matches!(err, SourceError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn cancellation_stops_waiting() {
    let source = ConsulSource::new(SlowFetcher::new(Duration::from_secs(5)));
    let cancel = CancellationToken::new();
    let ctx = FetchContext::new(Duration::from_secs(30)).with_cancel(cancel.clone());

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });
    let started = Instant::now();
    let err = source.load_with(&ctx).unwrap_err();
    canceller.join().expect("canceller");

    assert!(matches!(err, SourceError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// `Duration::MAX` means no deadline rather than an overflowing one.
#[test]
fn unbounded_timeout_loads_without_deadline() {
    let fetcher = ScriptedFetcher::new([("api-key", "k-123")]);
    let source = KeyVaultSource::new(fetcher.clone());
    source
        .load_with(&FetchContext::new(Duration::MAX))
        .expect("load without deadline");
    assert_eq!(source.lookup("api.key").expect("lookup"), Some(json!("k-123")));

    fetcher.set_entries([("api-key", "k-456")]);
    source
        .reload_with(&FetchContext::new(Duration::MAX))
        .expect("reload without deadline");
    assert_eq!(source.lookup("api.key").expect("lookup"), Some(json!("k-456")));
}

#[test]
fn unbounded_timeout_still_honours_cancellation() {
    let source = KeyVaultSource::new(SlowFetcher::new(Duration::from_secs(5)));
    let cancel = CancellationToken::new();
    let ctx = FetchContext::new(Duration::MAX).with_cancel(cancel.clone());

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });
    let started = Instant::now();
    let err = source.load_with(&ctx).unwrap_err();
    canceller.join().expect("canceller");

    assert!(matches!(err, SourceError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// A failed reload keeps serving the records from the last good load.
#[test]
fn failed_reload_keeps_previous_records() {
    let fetcher = ScriptedFetcher::new([("services/api/port", "8080")]);
    let source = ConsulSource::new(fetcher.clone()).with_key_prefix("services/api");
    source.load().expect("load");

    fetcher.set_entries([("services/api/port", "9090")]);
    fetcher.fail_next("leader election in progress");
    let err = source.reload().unwrap_err();
    assert!(matches!(err, SourceError::Unavailable { .. }));
    assert_eq!(source.lookup("port").expect("lookup"), Some(json!("8080")));

    source.reload().expect("reload");
    assert_eq!(source.lookup("port").expect("lookup"), Some(json!("9090")));
}

#[test]
fn registry_reload_refreshes_remote_values() {
    let fetcher = ScriptedFetcher::new([("feature-enabled", "false")]);
    let registry = Chipmunk::builder()
        .with_source(KeyVaultSource::new(fetcher.clone()).with_alias("vault"))
        .with_remote_loading(true)
        .build()
        .expect("registry");
    registry.load().expect("load");
    assert_eq!(
        registry.resolve("feature.enabled").expect("resolve"),
        Some(json!("false"))
    );

    fetcher.set_entries([("feature-enabled", "true")]);
    registry.reload().expect("reload");
    assert_eq!(
        registry.resolve("feature.enabled").expect("resolve"),
        Some(json!("true"))
    );
    assert_eq!(registry.source("vault").map(|source| source.keys().len()), Some(1));
}
