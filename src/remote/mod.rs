//! Distributed Tier Module
//!
//! Capability trait for an optional remote cache tier, and its Redis client.

mod redis_client;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use redis_client::RedisCacheClient;

// == Distributed Tier ==
/// A remote tier the facade can read from, write to and close.
///
/// Implementations keep "key absent" (`Ok(None)`) distinct from "operation
/// failed" (`Err`); the facade treats both as a reason to fall back.
#[async_trait]
pub trait DistributedTier: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Reads the raw bytes stored under `key`.
    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes raw bytes under `key`. A zero `ttl` stores without expiry.
    async fn store(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Releases connections. Called once at shutdown.
    async fn close(&self) -> Result<()>;

    /// Periodic housekeeping hook, run by the maintenance task.
    async fn maintain(&self) {}
}
