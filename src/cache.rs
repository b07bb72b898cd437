//! Bounded response cache
//!
//! A fixed-slot circular store mapping a canonical request target to the
//! response body served for it. Lookups run concurrently; inserts take
//! the write side of the lock and exclude everything else. There is no
//! eviction: an insert that would overflow the byte budget is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::CacheConfig;

/// One cached response, immutable after insertion.
#[derive(Debug)]
pub struct CacheEntry {
    /// Canonical request target (`host:port/path`)
    pub key: String,
    /// Response bytes exactly as the origin sent them
    pub body: Bytes,
    /// Body length, fixed at admission
    pub size: usize,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub rejected: u64,
    pub live_entries: usize,
    pub total_bytes: usize,
}

struct CacheState {
    /// Circular slot array; `rear % slots.len()` is the next insertion
    /// point, so scanning from `rear` forward visits oldest first.
    slots: Vec<Option<Arc<CacheEntry>>>,
    rear: usize,
    total_bytes: usize,
}

/// Fixed-capacity concurrent response cache.
pub struct WireCache {
    state: RwLock<CacheState>,
    max_cache_bytes: usize,
    max_object_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    rejected: AtomicU64,
}

impl WireCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: RwLock::new(CacheState {
                slots: (0..config.slots.max(1)).map(|_| None).collect(),
                rear: 0,
                total_bytes: 0,
            }),
            max_cache_bytes: config.max_cache_bytes,
            max_object_bytes: config.max_object_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Admit a response body under `key`.
    ///
    /// Silently refuses oversize objects and anything that would push
    /// the live byte total over the budget; returns whether the entry
    /// was admitted. A wraparound insert replaces the entry in the
    /// reused slot, and the replaced bytes leave the live total.
    pub fn insert(&self, key: String, body: Bytes) -> bool {
        let size = body.len();
        if size > self.max_object_bytes {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, size, "cache insert rejected: object over per-object cap");
            return false;
        }

        let mut state = self.state.write();
        if state.total_bytes + size > self.max_cache_bytes {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, size, "cache insert rejected: byte budget exhausted");
            return false;
        }

        let idx = state.rear % state.slots.len();
        if let Some(replaced) = state.slots[idx].take() {
            state.total_bytes -= replaced.size;
        }
        state.slots[idx] = Some(Arc::new(CacheEntry { key, body, size }));
        state.rear += 1;
        state.total_bytes += size;
        true
    }

    /// Find the first entry matching `key`, scanning oldest to newest.
    /// Concurrent lookups share the read side of the lock.
    pub fn lookup(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let state = self.state.read();
        let n = state.slots.len();
        for i in 0..n {
            let idx = (state.rear + i) % n;
            if let Some(entry) = &state.slots[idx] {
                if entry.key == key {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(Arc::clone(entry));
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Live payload bytes currently held.
    pub fn total_bytes(&self) -> usize {
        self.state.read().total_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            live_entries: state.slots.iter().filter(|s| s.is_some()).count(),
            total_bytes: state.total_bytes,
        }
    }
}
