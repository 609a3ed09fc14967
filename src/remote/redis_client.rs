//! Redis Client Module
//!
//! Pooled Redis client with ACL authentication, per-operation timeouts and
//! bounded retries for transient failures.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use once_cell::sync::OnceCell;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::{JsonCodec, ValueCodec};
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use crate::remote::DistributedTier;

/// Upper bound on the startup liveness check.
const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// First retry delay; doubles per attempt.
const MIN_RETRY_BACKOFF: Duration = Duration::from_millis(8);

const MAX_RETRY_BACKOFF: Duration = Duration::from_millis(512);

// == Redis Cache Client ==
/// Client for one Redis endpoint.
///
/// Constructed uninitialized; [`RedisCacheClient::init`] builds the pool and
/// checks liveness exactly once.
pub struct RedisCacheClient<C: ValueCodec = JsonCodec> {
    config: RedisConfig,
    /// TTL applied to every write
    ttl: Duration,
    codec: C,
    pool: OnceCell<Pool>,
    closed: AtomicBool,
}

impl RedisCacheClient<JsonCodec> {
    /// Creates a client using the JSON codec.
    pub fn new(config: RedisConfig, ttl: Duration) -> Self {
        Self::with_codec(config, ttl, JsonCodec)
    }
}

impl<C: ValueCodec> RedisCacheClient<C> {
    pub fn with_codec(config: RedisConfig, ttl: Duration, codec: C) -> Self {
        Self {
            config,
            ttl,
            codec,
            pool: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.get().is_some() && !self.closed.load(Ordering::Acquire)
    }

    // == Init ==
    /// Builds the connection pool, pings the server and pre-warms idle
    /// connections.
    ///
    /// Fails with [`CacheError::AlreadyInitialized`] on a second call and with
    /// [`CacheError::TierUnavailable`] when the server cannot be reached.
    pub async fn init(&self) -> Result<()> {
        if self.pool.get().is_some() {
            return Err(CacheError::AlreadyInitialized);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        self.config.validate()?;

        let mut pool_config = PoolConfig::new(self.config.max_active_conns);
        pool_config.timeouts.wait = Some(self.config.connect_timeout());
        pool_config.timeouts.create = Some(self.config.connect_timeout());
        pool_config.timeouts.recycle = Some(self.config.read_timeout());

        let mut redis_config = deadpool_redis::Config::from_url(self.connection_url()?);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::remote_unavailable(format!("failed to create pool: {e}")))?;

        if !self.config.username.is_empty() {
            info!(
                user = %self.config.username,
                "Redis: using ACL user for Redis 6.0+ authentication"
            );
        }

        Self::ping(&pool).await.map_err(|e| {
            CacheError::remote_unavailable(format!(
                "failed to connect to {}: {e}",
                self.config.endpoint()
            ))
        })?;

        self.prewarm(&pool).await;

        self.pool
            .set(pool)
            .map_err(|_| CacheError::AlreadyInitialized)?;

        info!(
            endpoint = %self.config.endpoint(),
            db = self.config.db,
            acl_user = !self.config.username.is_empty(),
            max_active = self.config.max_active_conns,
            "Redis cache initialized successfully"
        );
        Ok(())
    }

    // == Set ==
    /// Encodes `value` and writes it with the configured TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        self.store(key, &bytes, self.ttl).await
    }

    // == Get ==
    /// Reads and decodes `key`.
    ///
    /// Absent keys, failed reads and undecodable values all return None;
    /// failures are logged, not returned.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.fetch(key).await {
            Ok(Some(bytes)) => match self.codec.decode(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, codec = self.codec.name(), error = %e, "Failed to decode Redis value");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Redis get failed");
                None
            }
        }
    }

    fn pool(&self) -> Result<&Pool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        self.pool.get().ok_or(CacheError::NotInitialized)
    }

    /// Connection URL with percent-encoded credentials. Never logged.
    fn connection_url(&self) -> Result<String> {
        let host = if self.config.host.contains(':') {
            format!("[{}]", self.config.host)
        } else {
            self.config.host.clone()
        };
        let mut url = Url::parse(&format!("redis://{}:{}/{}", host, self.config.port, self.config.db))
            .map_err(|e| CacheError::Config(format!("invalid redis endpoint: {e}")))?;

        if !self.config.username.is_empty() {
            url.set_username(&self.config.username)
                .map_err(|_| CacheError::Config("invalid redis username".to_string()))?;
        }
        if !self.config.password.is_empty() {
            url.set_password(Some(&self.config.password))
                .map_err(|_| CacheError::Config("invalid redis password".to_string()))?;
        }
        Ok(url.into())
    }

    async fn ping(pool: &Pool) -> Result<()> {
        let check = async {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| CacheError::remote_unavailable(e.to_string()))?;
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            debug!(reply = %pong, "Redis PING");
            Ok::<_, CacheError>(())
        };

        tokio::time::timeout(PING_TIMEOUT, check)
            .await
            .map_err(|_| CacheError::Timeout {
                operation: "PING",
                after: PING_TIMEOUT,
            })?
    }

    /// Opens `min_idle_conns` connections and hands them back to the pool.
    async fn prewarm(&self, pool: &Pool) {
        let mut warm = Vec::with_capacity(self.config.min_idle_conns);
        for _ in 0..self.config.min_idle_conns {
            match pool.get().await {
                Ok(conn) => warm.push(conn),
                Err(e) => {
                    debug!(error = %e, opened = warm.len(), "Redis pre-warm stopped early");
                    break;
                }
            }
        }
        debug!(idle = warm.len(), "Redis pool pre-warmed");
    }

    /// Drops idle connections above `max_idle_conns`. Returns how many were dropped.
    fn trim_idle(&self) -> usize {
        let Ok(pool) = self.pool() else {
            return 0;
        };

        let available = usize::try_from(pool.status().available).unwrap_or(0);
        if available <= self.config.max_idle_conns {
            return 0;
        }

        let excess = available - self.config.max_idle_conns;
        let mut remaining = excess;
        let _ = pool.retain(|_, _| {
            if remaining > 0 {
                remaining -= 1;
                false
            } else {
                true
            }
        });

        let dropped = excess - remaining;
        debug!(dropped, "Trimmed idle Redis connections");
        dropped
    }

    /// Runs `attempt` until it succeeds, fails permanently, or `max_retries`
    /// transient failures have been retried.
    async fn with_retries<T, F, Fut>(&self, operation: &'static str, key: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0u32;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retries < self.config.max_retries => {
                    let delay = retry_backoff(retries);
                    debug!(
                        operation,
                        key = %key,
                        attempt = retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying Redis operation"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, pool: &Pool, key: &str) -> Result<Option<Vec<u8>>> {
        let after = self.config.read_timeout();
        let op = async {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| CacheError::remote_unavailable(e.to_string()))?;
            let value: Option<Vec<u8>> = conn.get(key).await?;
            Ok::<_, CacheError>(value)
        };

        tokio::time::timeout(after, op)
            .await
            .map_err(|_| CacheError::Timeout {
                operation: "GET",
                after,
            })?
    }

    async fn store_once(&self, pool: &Pool, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let after = self.config.write_timeout();
        let op = async {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| CacheError::remote_unavailable(e.to_string()))?;
            if ttl.is_zero() {
                conn.set::<_, _, ()>(key, value).await?;
            } else {
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
                conn.pset_ex::<_, _, ()>(key, value, millis).await?;
            }
            Ok::<_, CacheError>(())
        };

        tokio::time::timeout(after, op)
            .await
            .map_err(|_| CacheError::Timeout {
                operation: "SET",
                after,
            })?
    }
}

#[async_trait]
impl<C: ValueCodec> DistributedTier for RedisCacheClient<C> {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let pool = self.pool()?;
        let value = self
            .with_retries("GET", key, || self.fetch_once(pool, key))
            .await?;
        if value.is_none() {
            debug!(key = %key, "Redis miss");
        }
        Ok(value)
    }

    async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let pool = self.pool()?;
        self.with_retries("SET", key, || self.store_once(pool, key, value, ttl))
            .await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(pool) = self.pool.get() {
            pool.close();
            info!(endpoint = %self.config.endpoint(), "Redis connection pool closed");
        }
        Ok(())
    }

    async fn maintain(&self) {
        self.trim_idle();
    }
}

impl<C: ValueCodec> fmt::Debug for RedisCacheClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheClient")
            .field("endpoint", &self.config.endpoint())
            .field("db", &self.config.db)
            .field("ttl", &self.ttl)
            .field("codec", &self.codec.name())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Exponential backoff: 8ms, 16ms, 32ms ... capped at 512ms.
fn retry_backoff(retry: u32) -> Duration {
    MIN_RETRY_BACKOFF
        .saturating_mul(1u32 << retry.min(16))
        .min(MAX_RETRY_BACKOFF)
}
