// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::{Arc, Mutex};

fn filled(keys: &[&'static str], max_size: usize) -> PinnedLruCache<&'static str, u32> {
    let mut cache = PinnedLruCache::new(max_size);
    for (i, key) in keys.iter().enumerate() {
        cache.set(*key, i as u32);
    }
    cache
}

fn recording_cache(max_size: usize) -> (PinnedLruCache<&'static str, u32>, Arc<Mutex<Vec<&'static str>>>) {
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&evicted);
    let cache = PinnedLruCache::new(max_size).with_eviction_callback(move |key, _value| {
        sink.lock().unwrap().push(key);
        Ok(())
    });
    (cache, evicted)
}

#[test]
fn inserting_past_capacity_evicts_least_recent() {
    let cache = filled(&["a", "b", "c", "d"], 3);
    assert!(!cache.contains(&"a"));
    assert_eq!(cache.keys(), vec!["b", "c", "d"]);
}

#[test]
fn pinned_oldest_entry_survives_insert() {
    let mut cache = filled(&["a", "b", "c"], 3);
    assert!(cache.pin(&"a"));
    cache.set("d", 3);

    assert!(cache.contains(&"a"));
    assert!(!cache.contains(&"b"));
    assert_eq!(cache.len(), 3);
}

#[test]
fn get_refreshes_recency() {
    let mut cache = filled(&["a", "b", "c"], 3);
    assert_eq!(cache.get(&"a"), Some(&0));
    cache.set("d", 3);

    assert!(cache.contains(&"a"));
    assert!(!cache.contains(&"b"));
}

#[test]
fn get_on_pinned_entry_leaves_recency_untouched() {
    let mut cache = filled(&["a", "b", "c"], 3);
    cache.pin(&"a");
    cache.get(&"a");
    cache.unpin(&"a");
    cache.set("d", 3);

    // "a" was still the oldest because the pinned read did not refresh it
    assert!(!cache.contains(&"a"));
}

#[test]
fn set_existing_key_updates_value_and_recency() {
    let mut cache = filled(&["a", "b", "c"], 3);
    cache.set("a", 99);
    cache.set("d", 3);

    assert_eq!(cache.peek(&"a"), Some(&99));
    assert!(!cache.contains(&"b"));
}

#[test]
fn all_pinned_allows_overflow() {
    let mut cache = filled(&["a", "b"], 2);
    cache.pin(&"a");
    cache.pin(&"b");
    cache.set("c", 2);

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.stats().overflows, 1);
}

#[test]
fn overflow_is_reclaimed_after_unpin() {
    let mut cache = filled(&["a", "b"], 2);
    cache.pin(&"a");
    cache.pin(&"b");
    cache.set("c", 2);
    cache.unpin(&"a");
    cache.unpin(&"b");
    cache.set("d", 3);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.keys(), vec!["c", "d"]);
}

#[test]
fn pin_missing_key_is_noop() {
    let mut cache: PinnedLruCache<&str, u32> = PinnedLruCache::new(2);
    assert!(!cache.pin(&"missing"));
    assert_eq!(cache.pinned_count(), 0);
}

#[test]
fn unpin_is_idempotent() {
    let mut cache = filled(&["a"], 2);
    cache.pin(&"a");
    assert!(cache.unpin(&"a"));
    assert!(cache.unpin(&"a"));
    assert!(!cache.is_pinned(&"a"));
}

#[test]
fn shrink_skips_pinned_oldest_entry() {
    let (mut cache, evicted) = recording_cache(4);
    for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
        cache.set(key, i as u32);
    }
    cache.pin(&"a");
    cache.set_max_size(2);

    assert!(cache.contains(&"a"));
    assert!(cache.contains(&"d"));
    assert_eq!(cache.len(), 2);
    assert_eq!(*evicted.lock().unwrap(), vec!["b", "c"]);
}

#[test]
fn shrink_stops_when_only_pinned_remain() {
    let mut cache = filled(&["a", "b", "c"], 3);
    cache.pin(&"a");
    cache.pin(&"b");
    cache.set_max_size(1);

    assert_eq!(cache.keys(), vec!["a", "b"]);
}

#[test]
fn eviction_callback_fires_for_implicit_evictions_only() {
    let (mut cache, evicted) = recording_cache(2);
    cache.set("a", 0);
    cache.set("b", 1);
    assert_eq!(cache.delete(&"a"), Some(0));
    cache.set("c", 2);
    cache.set("d", 3);

    assert_eq!(*evicted.lock().unwrap(), vec!["b"]);
}

#[test]
fn failing_eviction_callback_does_not_abort_eviction() {
    let mut cache: PinnedLruCache<&'static str, u32> =
        PinnedLruCache::new(1).with_eviction_callback(|_key, _value| Err("sink unavailable".into()));
    cache.set("a", 0);
    cache.set("b", 1);

    assert!(!cache.contains(&"a"));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn stats_track_hits_and_misses() {
    let mut cache = filled(&["a"], 2);
    cache.get(&"a");
    cache.get(&"a");
    cache.get(&"z");

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
}

#[test]
fn zero_capacity_is_clamped() {
    let cache: PinnedLruCache<u8, u8> = PinnedLruCache::new(0);
    assert_eq!(cache.max_size(), 1);
}

// Parametrized tests with yare
use yare::parameterized;

#[parameterized(
    no_pins_evicts_first = { &[], "a" },
    first_pinned_evicts_second = { &["a"], "b" },
    two_pinned_evicts_third = { &["a", "b"], "c" },
)]
fn victim_skips_pinned(pinned: &[&'static str], expected_victim: &'static str) {
    let (mut cache, evicted) = recording_cache(3);
    for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
        cache.set(key, i as u32);
    }
    for key in pinned {
        cache.pin(key);
    }
    cache.set("d", 3);

    assert_eq!(*evicted.lock().unwrap(), vec![expected_victim]);
}

// Property-based tests
use proptest::prelude::*;

proptest! {
    #[test]
    fn size_never_exceeds_max_without_pins(
        max_size in 1usize..8,
        keys in proptest::collection::vec(0u8..32, 0..64)
    ) {
        let mut cache = PinnedLruCache::new(max_size);
        for key in keys {
            cache.set(key, ());
            prop_assert!(cache.len() <= max_size);
        }
    }

    #[test]
    fn pinned_entries_are_never_evicted(
        keys in proptest::collection::vec(0u8..32, 1..64)
    ) {
        let mut cache = PinnedLruCache::new(4);
        cache.set(255u8, ());
        cache.pin(&255);
        for key in keys {
            cache.set(key, ());
            prop_assert!(cache.contains(&255));
        }
        cache.set_max_size(1);
        prop_assert!(cache.contains(&255));
    }
}
