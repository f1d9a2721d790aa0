//! Pinned LRU cache holding values that are not yet durable.

use harbor_core::cache::PinnedLruCache;
use std::sync::{Arc, Mutex};

#[test]
fn pinned_values_outlive_eviction_pressure() {
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&evicted);
    let mut cache = PinnedLruCache::new(2).with_eviction_callback(move |key: String, _value: u32| {
        sink.lock().unwrap().push(key);
        Ok(())
    });

    cache.set("unsaved".to_string(), 1);
    assert!(cache.pin(&"unsaved".to_string()));
    for (n, key) in ["a", "b", "c"].iter().enumerate() {
        cache.set(key.to_string(), n as u32);
    }

    assert!(cache.contains(&"unsaved".to_string()));
    assert_eq!(*evicted.lock().unwrap(), vec!["a", "b"]);

    // Once durable, the value becomes an ordinary eviction candidate
    assert!(cache.unpin(&"unsaved".to_string()));
    cache.set("d".to_string(), 9);
    assert!(!cache.contains(&"unsaved".to_string()));
    assert_eq!(cache.stats().evictions, 3);
}
