// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vector clock over context ids

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Per-context counters used to reconstruct happened-before relations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CausalClock(BTreeMap<String, u64>);

impl CausalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, context: &str) -> u64 {
        self.0.get(context).copied().unwrap_or(0)
    }

    /// Record a local step for `context`, returning its new counter
    pub fn tick(&mut self, context: &str) -> u64 {
        let counter = self.0.entry(context.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Pointwise maximum with `other` (on message receipt)
    pub fn merge(&mut self, other: &CausalClock) {
        for (context, &counter) in &other.0 {
            let mine = self.0.entry(context.clone()).or_insert(0);
            *mine = (*mine).max(counter);
        }
    }

    pub fn partial_cmp_clock(&self, other: &CausalClock) -> Option<Ordering> {
        let mut less = false;
        let mut greater = false;
        for context in self.0.keys().chain(other.0.keys()) {
            match self.get(context).cmp(&other.get(context)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (false, false) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (true, true) => None,
        }
    }

    pub fn happened_before(&self, other: &CausalClock) -> bool {
        self.partial_cmp_clock(other) == Some(Ordering::Less)
    }

    pub fn concurrent_with(&self, other: &CausalClock) -> bool {
        self.partial_cmp_clock(other).is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, u64)> for CausalClock {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(pairs: &[(&str, u64)]) -> CausalClock {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn tick_increments_own_counter() {
        let mut c = CausalClock::new();
        assert_eq!(c.tick("tab-a"), 1);
        assert_eq!(c.tick("tab-a"), 2);
        assert_eq!(c.get("tab-b"), 0);
    }

    #[test]
    fn merge_takes_pointwise_max() {
        let mut a = clock(&[("tab-a", 3), ("tab-b", 1)]);
        a.merge(&clock(&[("tab-b", 4), ("tab-c", 2)]));
        assert_eq!(a, clock(&[("tab-a", 3), ("tab-b", 4), ("tab-c", 2)]));
    }

    #[test]
    fn happened_before_requires_dominance() {
        let earlier = clock(&[("tab-a", 1)]);
        let later = clock(&[("tab-a", 2), ("tab-b", 1)]);
        assert!(earlier.happened_before(&later));
        assert!(!later.happened_before(&earlier));
        assert!(!earlier.happened_before(&earlier));
    }

    #[test]
    fn divergent_clocks_are_concurrent() {
        let a = clock(&[("tab-a", 2), ("tab-b", 1)]);
        let b = clock(&[("tab-a", 1), ("tab-b", 2)]);
        assert!(a.concurrent_with(&b));
        assert!(!a.happened_before(&b));
    }
}
