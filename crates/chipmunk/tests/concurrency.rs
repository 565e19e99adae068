//! Tests for thread-safety of source record stores.

use chipmunk::{KeyVaultSource, MemorySource, Source, Value};
use chipmunk_test_utils::ScriptedFetcher;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// Concurrent `get_or_set` calls agree on a single stored value.
#[test]
fn get_or_set_has_one_winner() {
    let source = Arc::new(MemorySource::new());
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|idx| {
            let source = Arc::clone(&source);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                source.get_or_set("leader", json!(idx))
            })
        })
        .collect();

    let results: Vec<Value> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .collect();
    let stored = source.get_or_default("leader", Value::Null);
    assert!(results.iter().all(|value| value == &stored));
    assert_eq!(source.keys(), vec!["leader".to_string()]);
}

/// Concurrent writers to distinct keys never lose an update.
#[test]
fn concurrent_sets_are_not_lost() {
    let source = Arc::new(MemorySource::new());
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let source = Arc::clone(&source);
            thread::spawn(move || {
                for idx in 0..50 {
                    source.set(&format!("w{worker}.k{idx}"), json!(idx));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }
    assert_eq!(source.keys().len(), 8 * 50);
}

/// Readers observe either the whole old record set or the whole new one.
#[test]
fn reload_is_never_observed_half_applied() {
    let fetcher = ScriptedFetcher::new(generation(1));
    let source = Arc::new(KeyVaultSource::new(fetcher.clone()));
    source.load().expect("load");

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let source = Arc::clone(&source);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0usize;
                while !done.load(Ordering::SeqCst) {
                    let records = source.read();
                    assert_eq!(records.len(), 3);
                    let first = &records[0].value;
                    assert!(
                        records.iter().all(|record| &record.value == first),
                        "mixed snapshot: {records:?}"
                    );
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for round in 0..100 {
        fetcher.set_entries(generation(if round % 2 == 0 { 2 } else { 1 }));
        source.reload().expect("reload");
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        reader.join().expect("reader");
    }
    assert_eq!(fetcher.calls(), 101);
}

fn generation(value: i64) -> Vec<(String, Value)> {
    ["alpha", "beta", "gamma"]
        .iter()
        .map(|key| (key.to_string(), json!(value)))
        .collect()
}
