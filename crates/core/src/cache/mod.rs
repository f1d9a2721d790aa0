// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory caching
//!
//! - `PinnedLruCache` - recency eviction that never implicitly evicts
//!   entries pinned by an in-flight producer or consumer

mod pinned;

pub use pinned::{CacheStats, EvictionCallback, EvictionError, PinnedLruCache};
