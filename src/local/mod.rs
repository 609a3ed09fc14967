//! Local Tier Module
//!
//! Provides the bounded in-process cache: cost-weighted admission and
//! eviction, per-entry TTL and drop notifications.

mod entry;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::{LocalCache, RejectionListener};

/// Estimated footprint of an encoded entry: key bytes plus value bytes.
pub fn estimate_cost(key: &str, value: &[u8]) -> u64 {
    (key.len() + value.len()) as u64
}
