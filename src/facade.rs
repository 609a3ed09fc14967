//! Cache Facade Module
//!
//! Public entry point: owns the one-time lifecycle of both tiers and routes
//! every read and write through the fallback policy.
//!
//! # Fallback policy
//! - `set` writes to Redis when present; only when that fails (or Redis is
//!   absent) is the local tier written, using the global TTL.
//! - `get` reads Redis when present; a miss, failure or undecodable value
//!   falls through to the local tier.
//! - The tiers are never synchronized. A value written to Redis is not visible
//!   locally once Redis goes away.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{JsonCodec, ValueCodec};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::local::{estimate_cost, CacheStats, LocalCache, RejectionListener};
use crate::remote::{DistributedTier, RedisCacheClient};
use crate::tasks::spawn_maintenance_task;

// == Lifecycle State ==
/// Observable lifecycle of a [`CacheFacade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Closed,
}

enum Lifecycle {
    Uninitialized,
    Ready(Arc<Tiers>),
    Closed,
}

/// Tiers owned by a ready facade.
struct Tiers {
    local: Arc<LocalCache>,
    remote: Option<Arc<dyn DistributedTier>>,
    /// Global TTL for writes without a per-call override
    ttl: Duration,
}

// == Cache Facade ==
/// Two-tier cache handle.
///
/// Construct once, `init` once, share by reference (or `Arc`) with consumers,
/// `close` once at shutdown.
pub struct CacheFacade<C: ValueCodec = JsonCodec> {
    codec: C,
    lifecycle: RwLock<Lifecycle>,
    rejection_listener: Option<RejectionListener>,
}

impl CacheFacade<JsonCodec> {
    /// Creates an uninitialized facade using the JSON codec.
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for CacheFacade<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ValueCodec> CacheFacade<C> {
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec,
            lifecycle: RwLock::new(Lifecycle::Uninitialized),
            rejection_listener: None,
        }
    }

    /// Forwards entries the local tier drops for space to `listener`.
    pub fn with_rejection_listener(mut self, listener: RejectionListener) -> Self {
        self.rejection_listener = Some(listener);
        self
    }

    pub fn state(&self) -> LifecycleState {
        match &*self.lifecycle.read() {
            Lifecycle::Uninitialized => LifecycleState::Uninitialized,
            Lifecycle::Ready(_) => LifecycleState::Ready,
            Lifecycle::Closed => LifecycleState::Closed,
        }
    }

    /// True when a distributed tier is attached.
    pub fn has_remote(&self) -> bool {
        matches!(&*self.lifecycle.read(), Lifecycle::Ready(tiers) if tiers.remote.is_some())
    }

    // == Init ==
    /// Builds the local tier and, when enabled, connects to Redis.
    ///
    /// A local tier failure is returned and leaves the facade uninitialized.
    /// A Redis failure is logged and the facade runs local-only. Fails with
    /// [`CacheError::AlreadyInitialized`] unless the facade is uninitialized.
    pub async fn init(&self, config: CacheConfig) -> Result<()> {
        self.ensure_uninitialized()?;
        let local = self.build_local(&config)?;

        let remote = if config.redis.enabled {
            let client = RedisCacheClient::with_codec(
                config.redis.clone(),
                config.ttl(),
                self.codec.clone(),
            );
            match client.init().await {
                Ok(()) => Some(Arc::new(client) as Arc<dyn DistributedTier>),
                Err(e) => {
                    warn!(
                        endpoint = %config.redis.endpoint(),
                        error = %e,
                        "Failed to initialize Redis cache, falling back to local cache"
                    );
                    None
                }
            }
        } else {
            info!("Redis cache disabled, using local in-memory cache");
            None
        };

        self.commit(local, remote, config.ttl()).await
    }

    /// Same contract as [`CacheFacade::init`] with a caller-supplied remote
    /// tier, which must already be connected.
    pub async fn init_with_remote(
        &self,
        config: CacheConfig,
        remote: Option<Arc<dyn DistributedTier>>,
    ) -> Result<()> {
        self.ensure_uninitialized()?;
        let local = self.build_local(&config)?;
        self.commit(local, remote, config.ttl()).await
    }

    // == Set ==
    /// Stores `value` under `key` with the global TTL.
    ///
    /// Succeeds when either tier accepted the write. A local admission
    /// rejection still counts as accepted; the key then reads as absent.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, Duration::ZERO).await
    }

    /// Stores `value` with a per-call TTL. `Duration::ZERO` uses the global TTL.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let tiers = self.tiers()?;
        let bytes = self.codec.encode(value)?;
        let ttl = if ttl.is_zero() { tiers.ttl } else { ttl };

        let remote_error = match &tiers.remote {
            Some(remote) => match remote.store(key, &bytes, ttl).await {
                Ok(()) => {
                    debug!(key = %key, tier = remote.name(), "cache set");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        key = %key,
                        error = %e,
                        "Redis set failed, falling back to local cache"
                    );
                    Some(e)
                }
            },
            None => None,
        };

        let cost = estimate_cost(key, &bytes);
        match tiers.local.set(key, bytes, cost, ttl) {
            Ok(()) => {
                debug!(key = %key, cost, tier = "local", "cache set");
                Ok(())
            }
            Err(CacheError::AdmissionRejected { .. }) => Ok(()),
            Err(local) => Err(CacheError::StoreFailed {
                remote: remote_error.map(Box::new),
                local: Box::new(local),
            }),
        }
    }

    // == Get ==
    /// Retrieves the value stored under `key` as `T`.
    ///
    /// Returns `Ok(None)` when no tier holds a live value of that type. Errors
    /// only report lifecycle misuse.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let tiers = self.tiers()?;

        if let Some(remote) = &tiers.remote {
            match remote.fetch(key).await {
                Ok(Some(bytes)) => match self.codec.decode(&bytes) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to decode Redis value");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        key = %key,
                        error = %e,
                        "Redis get failed, falling back to local cache"
                    );
                }
            }
        }

        let Some(bytes) = tiers.local.get(key) else {
            return Ok(None);
        };
        match self.codec.decode(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(key = %key, error = %e, "Local value does not match requested type");
                Ok(None)
            }
        }
    }

    // == Stats ==
    /// Local tier statistics.
    pub fn stats(&self) -> Result<CacheStats> {
        self.tiers()?.local.stats().ok_or(CacheError::Closed)
    }

    // == Maintenance ==
    /// Starts the background task that reaps expired local entries and trims
    /// idle remote connections every `interval`.
    /// Fails with [`CacheError::Config`] for a zero interval.
    pub fn spawn_maintenance(&self, interval: Duration) -> Result<JoinHandle<()>> {
        if interval.is_zero() {
            return Err(CacheError::Config(
                "maintenance interval must be positive".to_string(),
            ));
        }
        let tiers = self.tiers()?;
        Ok(spawn_maintenance_task(
            Arc::clone(&tiers.local),
            tiers.remote.clone(),
            interval,
        ))
    }

    // == Close ==
    /// Closes the remote tier, then the local tier.
    ///
    /// Both tiers are closed even if the first fails; failures are returned
    /// together as [`CacheError::CloseFailed`]. The facade is `Closed`
    /// afterwards either way.
    pub async fn close(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.lifecycle.write(), Lifecycle::Closed);
        let tiers = match previous {
            Lifecycle::Ready(tiers) => tiers,
            Lifecycle::Uninitialized => return Ok(()),
            Lifecycle::Closed => return Err(CacheError::Closed),
        };

        let mut errors = Vec::new();
        if let Some(remote) = &tiers.remote {
            if let Err(e) = remote.close().await {
                warn!(tier = remote.name(), error = %e, "Failed to close remote tier");
                errors.push(e);
            }
        }
        if let Err(e) = tiers.local.close() {
            warn!(error = %e, "Failed to close local tier");
            errors.push(e);
        }

        if errors.is_empty() {
            info!("Cache closed");
            Ok(())
        } else {
            Err(CacheError::CloseFailed(errors))
        }
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        match &*self.lifecycle.read() {
            Lifecycle::Uninitialized => Ok(()),
            _ => Err(CacheError::AlreadyInitialized),
        }
    }

    fn build_local(&self, config: &CacheConfig) -> Result<Arc<LocalCache>> {
        let mut local = LocalCache::from_config(config)?;
        if let Some(listener) = &self.rejection_listener {
            local = local.with_rejection_listener(Arc::clone(listener));
        }
        info!(
            num_counters = config.num_counters,
            max_cost = config.max_cost,
            ttl_secs = config.ttl,
            "Local in-memory cache initialized"
        );
        Ok(Arc::new(local))
    }

    async fn commit(
        &self,
        local: Arc<LocalCache>,
        remote: Option<Arc<dyn DistributedTier>>,
        ttl: Duration,
    ) -> Result<()> {
        let tiers = Arc::new(Tiers { local, remote, ttl });
        let installed = {
            let mut lifecycle = self.lifecycle.write();
            if matches!(*lifecycle, Lifecycle::Uninitialized) {
                *lifecycle = Lifecycle::Ready(Arc::clone(&tiers));
                true
            } else {
                false
            }
        };

        if !installed {
            // Lost a race with a concurrent init; release what was built.
            if let Some(remote) = &tiers.remote {
                let _ = remote.close().await;
            }
            let _ = tiers.local.close();
            return Err(CacheError::AlreadyInitialized);
        }

        info!(remote = tiers.remote.is_some(), "Cache ready");
        Ok(())
    }

    fn tiers(&self) -> Result<Arc<Tiers>> {
        match &*self.lifecycle.read() {
            Lifecycle::Ready(tiers) => Ok(Arc::clone(tiers)),
            Lifecycle::Uninitialized => Err(CacheError::NotInitialized),
            Lifecycle::Closed => Err(CacheError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Remote tier whose close always fails.
    struct BrokenRemote;

    #[async_trait]
    impl DistributedTier for BrokenRemote {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn fetch(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(CacheError::remote_unavailable("down"))
        }

        async fn store(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
            Err(CacheError::remote_unavailable("down"))
        }

        async fn close(&self) -> Result<()> {
            Err(CacheError::remote_unavailable("close failed"))
        }
    }

    fn small_config() -> CacheConfig {
        CacheConfig {
            ttl: 60,
            num_counters: 1000,
            max_cost: 10_000,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let cache = CacheFacade::new();
        assert_eq!(cache.state(), LifecycleState::Uninitialized);

        cache.init(small_config()).await.unwrap();
        assert_eq!(cache.state(), LifecycleState::Ready);
        assert!(!cache.has_remote());

        cache.close().await.unwrap();
        assert_eq!(cache.state(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn test_operations_before_init() {
        let cache = CacheFacade::new();
        assert!(matches!(cache.set("k", &1).await, Err(CacheError::NotInitialized)));
        assert!(matches!(cache.get::<i32>("k").await, Err(CacheError::NotInitialized)));
        assert!(matches!(cache.stats(), Err(CacheError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_local_construction_failure_is_fatal() {
        let cache = CacheFacade::new();
        let config = CacheConfig {
            max_cost: 0,
            ..small_config()
        };

        assert!(matches!(cache.init(config).await, Err(CacheError::Config(_))));
        assert_eq!(cache.state(), LifecycleState::Uninitialized);
    }

    #[tokio::test]
    async fn test_init_after_close_is_rejected() {
        let cache = CacheFacade::new();
        cache.init(small_config()).await.unwrap();
        cache.close().await.unwrap();

        assert!(matches!(
            cache.init(small_config()).await,
            Err(CacheError::AlreadyInitialized)
        ));
        assert_eq!(cache.state(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn test_operations_after_close() {
        let cache = CacheFacade::new();
        cache.init(small_config()).await.unwrap();
        cache.close().await.unwrap();

        assert!(matches!(cache.set("k", &1).await, Err(CacheError::Closed)));
        assert!(matches!(cache.get::<i32>("k").await, Err(CacheError::Closed)));
        assert!(matches!(cache.close().await, Err(CacheError::Closed)));
    }

    #[tokio::test]
    async fn test_close_aggregates_and_still_closes_local() {
        let cache = CacheFacade::new();
        cache
            .init_with_remote(small_config(), Some(Arc::new(BrokenRemote)))
            .await
            .unwrap();
        assert!(cache.has_remote());

        match cache.close().await {
            Err(CacheError::CloseFailed(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected CloseFailed, got {other:?}"),
        }
        assert_eq!(cache.state(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn test_encode_failure_is_returned() {
        let cache = CacheFacade::new();
        cache.init(small_config()).await.unwrap();

        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), 3);
        assert!(matches!(cache.set("k", &map).await, Err(CacheError::Encode(_))));
    }

    #[tokio::test]
    async fn test_wrong_type_reads_as_absent() {
        let cache = CacheFacade::new();
        cache.init(small_config()).await.unwrap();

        cache.set("k", "a string").await.unwrap();
        assert_eq!(cache.get::<u64>("k").await.unwrap(), None);
        assert_eq!(
            cache.get::<String>("k").await.unwrap().as_deref(),
            Some("a string")
        );
    }

    #[tokio::test]
    async fn test_oversized_overwrite_never_serves_old_value() {
        let cache = CacheFacade::new();
        let config = CacheConfig {
            max_cost: 100,
            ..small_config()
        };
        cache.init(config).await.unwrap();

        cache.set("k", "old").await.unwrap();
        cache.set("k", &"x".repeat(200)).await.unwrap();

        assert_eq!(cache.get::<String>("k").await.unwrap(), None);
        assert_eq!(cache.stats().unwrap().rejections, 1);
    }

    #[tokio::test]
    async fn test_zero_maintenance_interval_is_rejected() {
        let cache = CacheFacade::new();
        cache.init(small_config()).await.unwrap();

        assert!(matches!(
            cache.spawn_maintenance(Duration::ZERO),
            Err(CacheError::Config(_))
        ));
        let handle = cache.spawn_maintenance(Duration::from_secs(60)).unwrap();
        handle.abort();
    }

    #[tokio::test]
    async fn test_stats_reflect_local_traffic() {
        let cache = CacheFacade::new();
        cache.init(small_config()).await.unwrap();

        cache.set("k", &42u32).await.unwrap();
        let _ = cache.get::<u32>("k").await.unwrap();
        let _ = cache.get::<u32>("missing").await.unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }
}
