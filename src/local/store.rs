//! Local Cache Module
//!
//! Bounded in-process cache on top of `moka`: entries are weighted by their
//! cost, admission and eviction follow moka's TinyLFU policy, and each entry
//! expires after the TTL it was written with.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::sync::Cache;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{validate_local_sizing, CacheConfig};
use crate::error::{CacheError, Result};
use crate::local::entry::EntryExpiry;
use crate::local::stats::StatsRecorder;
use crate::local::{CacheEntry, CacheStats};

/// Callback invoked with `(key, cost)` for every entry the size policy drops:
/// oversized writes, candidates that lose admission, and evicted residents.
pub type RejectionListener = Arc<dyn Fn(&str, u64) + Send + Sync>;

/// Costs above this cannot be represented as a weight.
const MAX_ENTRY_COST: u64 = u32::MAX as u64;

// == Local Cache ==
/// Thread-safe local tier. All synchronization is internal.
///
/// Occupancy is settled lazily; `stats`, `len` and `used_cost` apply pending
/// admission and expiry work before reading it.
pub struct LocalCache {
    /// None once closed
    inner: RwLock<Option<Cache<String, CacheEntry>>>,
    stats: Arc<StatsRecorder>,
    on_reject: Arc<OnceCell<RejectionListener>>,
    max_cost: u64,
}

impl LocalCache {
    // == Constructor ==
    /// Creates a new LocalCache.
    ///
    /// # Arguments
    /// * `num_counters` - Frequency counter budget, used to size the store
    /// * `max_cost` - Total cost budget for resident entries
    pub fn new(num_counters: u64, max_cost: u64) -> Result<Self> {
        validate_local_sizing(num_counters, max_cost)?;

        let stats = Arc::new(StatsRecorder::default());
        let on_reject: Arc<OnceCell<RejectionListener>> = Arc::new(OnceCell::new());

        let listener_stats = Arc::clone(&stats);
        let listener_hook = Arc::clone(&on_reject);
        let initial_capacity = usize::try_from(num_counters / 10).unwrap_or(usize::MAX);

        let cache = Cache::builder()
            .max_capacity(max_cost)
            .initial_capacity(initial_capacity)
            .weigher(|_key: &String, entry: &CacheEntry| entry.weight())
            .expire_after(EntryExpiry)
            .eviction_listener(move |key: Arc<String>, entry: CacheEntry, cause| match cause {
                RemovalCause::Size => {
                    listener_stats.record_eviction();
                    debug!(key = %key, cost = entry.cost, "Cache item dropped under cost pressure");
                    if let Some(listener) = listener_hook.get() {
                        listener(&key, entry.cost);
                    }
                }
                RemovalCause::Expired => listener_stats.record_expiration(),
                _ => {}
            })
            .build();

        debug!(num_counters, max_cost, "Local cache created");

        Ok(Self {
            inner: RwLock::new(Some(cache)),
            stats,
            on_reject,
            max_cost,
        })
    }

    /// Creates a LocalCache sized from the cache configuration.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(config.num_counters, config.max_cost)
    }

    /// Registers a callback for dropped entries. Only the first registration
    /// takes effect.
    pub fn with_rejection_listener(self, listener: RejectionListener) -> Self {
        let _ = self.on_reject.set(listener);
        self
    }

    // == Set ==
    /// Stores `value` under `key` with the given cost and TTL.
    ///
    /// A zero `ttl` means the entry never expires. A write whose cost alone
    /// exceeds the budget is refused with [`CacheError::AdmissionRejected`],
    /// and any previous value under `key` is dropped with it. Writes that fit
    /// may still lose admission later; that is reported to the rejection
    /// listener and counted in `evictions`. Fails with [`CacheError::Closed`]
    /// after `close`.
    pub fn set(&self, key: &str, value: impl Into<Arc<[u8]>>, cost: u64, ttl: Duration) -> Result<()> {
        let cache = self.cache().ok_or(CacheError::Closed)?;

        if cost > self.max_cost || cost > MAX_ENTRY_COST {
            cache.invalidate(key);
            self.stats.record_rejection();
            warn!(key = %key, cost, "Cache item rejected");
            if let Some(listener) = self.on_reject.get() {
                listener(key, cost);
            }
            return Err(CacheError::AdmissionRejected {
                key: key.to_string(),
                cost,
            });
        }

        cache.insert(key.to_string(), CacheEntry::new(value.into(), cost, ttl));
        self.stats.record_insert();
        Ok(())
    }

    // == Get ==
    /// Retrieves the bytes stored under `key`.
    ///
    /// Returns None for absent or expired entries. Always None after `close`.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        let cache = self.cache()?;
        match cache.get(key) {
            Some(entry) => {
                self.stats.record_hit();
                Some(entry.value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Cleanup Expired ==
    /// Applies pending maintenance, which removes expired entries.
    ///
    /// Returns the number of entries that expired during this call.
    pub fn cleanup_expired(&self) -> usize {
        let Some(cache) = self.cache() else {
            return 0;
        };
        let before = self.stats.expirations();
        cache.run_pending_tasks();
        usize::try_from(self.stats.expirations().saturating_sub(before)).unwrap_or(usize::MAX)
    }

    // == Stats ==
    /// Returns current statistics, or None after `close`.
    pub fn stats(&self) -> Option<CacheStats> {
        let cache = self.settled()?;
        Some(
            self.stats
                .snapshot(cache.entry_count(), cache.weighted_size(), self.max_cost),
        )
    }

    /// Sum of the costs of resident entries.
    pub fn used_cost(&self) -> u64 {
        self.settled().map_or(0, |cache| cache.weighted_size())
    }

    /// Current number of resident entries.
    pub fn len(&self) -> u64 {
        self.settled().map_or(0, |cache| cache.entry_count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }

    // == Close ==
    /// Drops every entry. A second call fails with [`CacheError::Closed`].
    pub fn close(&self) -> Result<()> {
        let cache = self.inner.write().take().ok_or(CacheError::Closed)?;
        cache.run_pending_tasks();
        let entries = cache.entry_count();
        cache.invalidate_all();
        cache.run_pending_tasks();
        info!(entries, "Local cache closed");
        Ok(())
    }

    fn cache(&self) -> Option<Cache<String, CacheEntry>> {
        self.inner.read().clone()
    }

    fn settled(&self) -> Option<Cache<String, CacheEntry>> {
        let cache = self.cache()?;
        cache.run_pending_tasks();
        Some(cache)
    }
}

impl fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCache")
            .field("max_cost", &self.max_cost)
            .field("closed", &self.is_closed())
            .field("has_rejection_listener", &self.on_reject.get().is_some())
            .finish()
    }
}
