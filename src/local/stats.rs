//! Cache Statistics Module
//!
//! Tracks local tier metrics including hits, misses, rejections and the
//! entries the size policy dropped.

use std::sync::atomic::{AtomicU64, Ordering};

// == Cache Stats ==
/// Snapshot of local tier counters and occupancy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of successful lookups
    pub hits: u64,
    /// Number of failed lookups (absent or expired)
    pub misses: u64,
    /// Number of writes handed to the store
    pub inserts: u64,
    /// Number of writes refused outright because their cost exceeds the budget
    pub rejections: u64,
    /// Number of entries dropped under cost pressure, either declined at
    /// admission or evicted later
    pub evictions: u64,
    /// Number of entries removed because their TTL elapsed
    pub expirations: u64,
    /// Current number of resident entries
    pub total_entries: u64,
    /// Sum of the costs of resident entries
    pub used_cost: u64,
    /// Configured cost budget
    pub max_cost: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Live counters shared between the cache handle and its eviction listener.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    rejections: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl StatsRecorder {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Combines the counters with the store's current occupancy.
    pub fn snapshot(&self, total_entries: u64, used_cost: u64, max_cost: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations(),
            total_entries,
            used_cost,
            max_cost,
        }
    }
}
