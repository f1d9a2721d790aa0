// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LRU cache with pinning
//!
//! Recency is tracked with a monotonically increasing tick per entry and a
//! `BTreeMap` from tick to key, so the oldest entry is always the first key
//! in the map. Pinned entries keep their tick but are skipped during victim
//! selection, and reads of a pinned entry do not refresh its tick.

use crate::config::CacheConfig;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

/// Error type returned by eviction callbacks
pub type EvictionError = Box<dyn std::error::Error + Send + Sync>;

/// Invoked for every implicit eviction (never for an explicit delete)
pub type EvictionCallback<K, V> = Box<dyn FnMut(K, V) -> Result<(), EvictionError> + Send>;

/// Hit/miss/eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Inserts that exceeded `max_size` because every entry was pinned
    pub overflows: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Slot<V> {
    value: V,
    tick: u64,
    pinned: bool,
}

/// Bounded key/value cache with least-recently-used eviction and pinning
pub struct PinnedLruCache<K, V> {
    max_size: usize,
    entries: HashMap<K, Slot<V>>,
    order: BTreeMap<u64, K>,
    next_tick: u64,
    on_evict: Option<EvictionCallback<K, V>>,
    stats: CacheStats,
}

impl<K, V> PinnedLruCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create a cache holding at most `max_size` unpinned entries (minimum 1)
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_tick: 0,
            on_evict: None,
            stats: CacheStats::default(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size)
    }

    /// Register the eviction callback, replacing any previous one
    pub fn with_eviction_callback(
        mut self,
        callback: impl FnMut(K, V) -> Result<(), EvictionError> + Send + 'static,
    ) -> Self {
        self.on_evict = Some(Box::new(callback));
        self
    }

    /// Look up a value, marking it most recently used unless pinned
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let Some(slot) = self.entries.get(key) else {
            self.stats.misses += 1;
            return None;
        };
        self.stats.hits += 1;

        if !slot.pinned {
            let old_tick = slot.tick;
            let tick = self.bump_tick();
            self.order.remove(&old_tick);
            self.order.insert(tick, key.clone());
            if let Some(slot) = self.entries.get_mut(key) {
                slot.tick = tick;
            }
        }

        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Look up a value without touching recency or counters
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Insert or update a value
    ///
    /// New keys at capacity evict the least recently used unpinned entry. If
    /// every entry is pinned the insert still happens and the cache overflows.
    pub fn set(&mut self, key: K, value: V) {
        let tick = self.bump_tick();

        if let Some(slot) = self.entries.get_mut(&key) {
            let old_tick = slot.tick;
            slot.value = value;
            slot.tick = tick;
            self.order.remove(&old_tick);
            self.order.insert(tick, key);
            return;
        }

        while self.entries.len() >= self.max_size {
            if !self.evict_oldest_unpinned() {
                self.stats.overflows += 1;
                tracing::warn!(
                    key = ?key,
                    size = self.entries.len() + 1,
                    max_size = self.max_size,
                    "all cache entries pinned, allowing overflow"
                );
                break;
            }
        }

        self.order.insert(tick, key.clone());
        self.entries.insert(
            key,
            Slot {
                value,
                tick,
                pinned: false,
            },
        );
    }

    /// Remove an entry without invoking the eviction callback
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot.value)
    }

    /// Exempt an entry from eviction. Returns false if the key is absent.
    pub fn pin(&mut self, key: &K) -> bool {
        match self.entries.get_mut(key) {
            Some(slot) => {
                slot.pinned = true;
                true
            }
            None => false,
        }
    }

    /// Make an entry evictable again. Unpinning twice is harmless.
    pub fn unpin(&mut self, key: &K) -> bool {
        match self.entries.get_mut(key) {
            Some(slot) => {
                slot.pinned = false;
                true
            }
            None => false,
        }
    }

    pub fn is_pinned(&self, key: &K) -> bool {
        self.entries.get(key).map(|slot| slot.pinned).unwrap_or(false)
    }

    pub fn pinned_count(&self) -> usize {
        self.entries.values().filter(|slot| slot.pinned).count()
    }

    /// Change capacity, evicting oldest unpinned entries until within bounds
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
        while self.entries.len() > self.max_size {
            if !self.evict_oldest_unpinned() {
                tracing::warn!(
                    size = self.entries.len(),
                    max_size = self.max_size,
                    "cache shrink stopped at pinned entries"
                );
                break;
            }
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> Vec<K> {
        self.order.values().cloned().collect()
    }

    /// Drop every entry, pinned or not, without invoking the callback
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn bump_tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Returns false when no unpinned entry exists
    fn evict_oldest_unpinned(&mut self) -> bool {
        let victim = self
            .order
            .iter()
            .find(|(_, key)| self.entries.get(*key).map(|s| !s.pinned).unwrap_or(false))
            .map(|(tick, key)| (*tick, key.clone()));

        let Some((tick, key)) = victim else {
            return false;
        };

        self.order.remove(&tick);
        let Some(slot) = self.entries.remove(&key) else {
            return false;
        };
        self.stats.evictions += 1;
        tracing::debug!(key = ?key, "evicted cache entry");

        if let Some(callback) = self.on_evict.as_mut() {
            if let Err(e) = callback(key.clone(), slot.value) {
                tracing::warn!(key = ?key, error = %e, "eviction callback failed");
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "pinned_tests.rs"]
mod tests;
