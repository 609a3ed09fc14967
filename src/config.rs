//! Configuration Module
//!
//! Handles loading the cache section from environment variables, or from any
//! serde source when the cache config is embedded in a larger application file.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CacheError, Result};

// == Cache Config ==
/// Sizing and TTL parameters for the cache, plus the optional Redis tier.
///
/// All values can be configured via `CACHE_*` environment variables with
/// sensible defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Global TTL in seconds applied to every write (0 = never expire)
    pub ttl: u64,
    /// Frequency counter budget, about ten per expected resident entry
    pub num_counters: u64,
    /// Total cost budget of the local tier
    pub max_cost: u64,
    /// Distributed tier settings
    pub redis: RedisConfig,
}

// == Redis Config ==
/// Connection settings for the optional Redis tier.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Enable the Redis tier
    #[serde(rename = "enable")]
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Redis 6.0+ ACL username, empty for password-only auth
    #[serde(rename = "redis_user")]
    pub username: String,
    /// Logical database index
    pub db: i64,
    /// Retries for transient failures on a single operation
    pub max_retries: u32,
    pub min_idle_conns: usize,
    pub max_idle_conns: usize,
    pub max_active_conns: usize,
    /// Connection establishment timeout in seconds
    pub connect_timeout: u64,
    /// Read timeout in seconds
    pub read_timeout: u64,
    /// Write timeout in seconds
    pub write_timeout: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL` - Global TTL in seconds (default: 86400)
    /// - `CACHE_NUM_COUNTERS` - Frequency counter budget (default: 100000)
    /// - `CACHE_MAX_COST` - Local tier cost budget (default: 1000000)
    /// - `CACHE_REDIS_*` - See [`RedisConfig::from_env`]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl: env_or("CACHE_TTL", defaults.ttl),
            num_counters: env_or("CACHE_NUM_COUNTERS", defaults.num_counters),
            max_cost: env_or("CACHE_MAX_COST", defaults.max_cost),
            redis: RedisConfig::from_env(),
        }
    }

    /// Global TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }

    /// Checks the local tier sizing. Failure here is fatal to the cache.
    pub fn validate(&self) -> Result<()> {
        validate_local_sizing(self.num_counters, self.max_cost)
    }
}

/// Largest accepted `num_counters`.
pub const MAX_NUM_COUNTERS: u64 = 1 << 30;

pub(crate) fn validate_local_sizing(num_counters: u64, max_cost: u64) -> Result<()> {
    if num_counters == 0 {
        return Err(CacheError::Config("num_counters must be positive".to_string()));
    }
    if num_counters > MAX_NUM_COUNTERS {
        return Err(CacheError::Config(format!(
            "num_counters must not exceed {MAX_NUM_COUNTERS}, got {num_counters}"
        )));
    }
    if max_cost == 0 {
        return Err(CacheError::Config("max_cost must be positive".to_string()));
    }
    Ok(())
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: 86_400,
            num_counters: 100_000,
            max_cost: 1_000_000,
            redis: RedisConfig::default(),
        }
    }
}

impl RedisConfig {
    /// Loads the Redis section from `CACHE_REDIS_*` environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_REDIS_ENABLE` (default: false)
    /// - `CACHE_REDIS_HOST` / `CACHE_REDIS_PORT` (default: localhost:6379)
    /// - `CACHE_REDIS_PASSWORD` / `CACHE_REDIS_USER` (default: empty)
    /// - `CACHE_REDIS_DB` (default: 0)
    /// - `CACHE_REDIS_MAX_RETRIES` (default: 3)
    /// - `CACHE_REDIS_MIN_IDLE_CONNS` / `MAX_IDLE_CONNS` / `MAX_ACTIVE_CONNS` (default: 5 / 10 / 100)
    /// - `CACHE_REDIS_CONNECT_TIMEOUT` / `READ_TIMEOUT` / `WRITE_TIMEOUT` in seconds (default: 10 / 5 / 5)
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            enabled: env_or("CACHE_REDIS_ENABLE", d.enabled),
            host: env_or("CACHE_REDIS_HOST", d.host),
            port: env_or("CACHE_REDIS_PORT", d.port),
            password: env_or("CACHE_REDIS_PASSWORD", d.password),
            username: env_or("CACHE_REDIS_USER", d.username),
            db: env_or("CACHE_REDIS_DB", d.db),
            max_retries: env_or("CACHE_REDIS_MAX_RETRIES", d.max_retries),
            min_idle_conns: env_or("CACHE_REDIS_MIN_IDLE_CONNS", d.min_idle_conns),
            max_idle_conns: env_or("CACHE_REDIS_MAX_IDLE_CONNS", d.max_idle_conns),
            max_active_conns: env_or("CACHE_REDIS_MAX_ACTIVE_CONNS", d.max_active_conns),
            connect_timeout: env_or("CACHE_REDIS_CONNECT_TIMEOUT", d.connect_timeout),
            read_timeout: env_or("CACHE_REDIS_READ_TIMEOUT", d.read_timeout),
            write_timeout: env_or("CACHE_REDIS_WRITE_TIMEOUT", d.write_timeout),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }

    /// `host:port` for log lines. Never includes credentials.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks connection and pool settings.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(CacheError::Config("redis host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(CacheError::Config("redis port must be positive".to_string()));
        }
        if self.db < 0 {
            return Err(CacheError::Config(format!(
                "redis db must not be negative, got {}",
                self.db
            )));
        }
        if self.max_active_conns == 0 {
            return Err(CacheError::Config(
                "redis max_active_conns must be positive".to_string(),
            ));
        }
        if self.min_idle_conns > self.max_active_conns {
            return Err(CacheError::Config(format!(
                "redis min_idle_conns ({}) exceeds max_active_conns ({})",
                self.min_idle_conns, self.max_active_conns
            )));
        }
        if self.connect_timeout == 0 || self.read_timeout == 0 || self.write_timeout == 0 {
            return Err(CacheError::Config(
                "redis timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            username: String::new(),
            db: 0,
            max_retries: 3,
            min_idle_conns: 5,
            max_idle_conns: 10,
            max_active_conns: 100,
            connect_timeout: 10,
            read_timeout: 5,
            write_timeout: 5,
        }
    }
}

// Manual impl keeps the password out of logs.
impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("username", &self.username)
            .field("db", &self.db)
            .field("max_retries", &self.max_retries)
            .field("min_idle_conns", &self.min_idle_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("max_active_conns", &self.max_active_conns)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
