//! Tiered Cache - a two-tier key/value cache
//!
//! A bounded in-process tier with frequency-based admission and TTL expiry,
//! fronted by an optional Redis tier. Reads and writes go to Redis first and
//! fall back to the local tier when Redis is absent or failing.

pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod local;
pub mod remote;
pub mod tasks;

pub use codec::{JsonCodec, ValueCodec};
pub use config::{CacheConfig, RedisConfig};
pub use error::{CacheError, Result};
pub use facade::{CacheFacade, LifecycleState};
pub use local::{CacheStats, LocalCache, RejectionListener};
pub use remote::{DistributedTier, RedisCacheClient};
pub use tasks::spawn_maintenance_task;
