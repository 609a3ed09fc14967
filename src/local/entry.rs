//! Cache Entry Module
//!
//! Defines the value stored in the local tier and its per-entry expiry policy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;

// == Cache Entry ==
/// Encoded bytes plus the cost and TTL they were written with.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored bytes, shared so hits never copy the payload
    pub value: Arc<[u8]>,
    /// Cost charged against the tier's budget
    pub cost: u64,
    /// Lifetime from the last write, None = no expiration
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    /// Creates a new entry. A zero `ttl` means the entry never expires.
    pub fn new(value: Arc<[u8]>, cost: u64, ttl: Duration) -> Self {
        Self {
            value,
            cost,
            ttl: (!ttl.is_zero()).then_some(ttl),
        }
    }

    /// Weight reported to the store's weigher, saturating at `u32::MAX`.
    pub fn weight(&self) -> u32 {
        u32::try_from(self.cost).unwrap_or(u32::MAX)
    }
}

// == Expiry ==
/// Expires each entry after the TTL it was last written with.
pub(crate) struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}
