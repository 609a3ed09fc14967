//! Error types for the tiered cache
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for both cache tiers and the facade.
#[derive(Error, Debug)]
pub enum CacheError {
    /// `init` was called on a component that already left the uninitialized state
    #[error("cache already initialized")]
    AlreadyInitialized,

    /// Operation issued before `init` completed
    #[error("cache not initialized")]
    NotInitialized,

    /// Operation issued after `close`
    #[error("cache closed")]
    Closed,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Value could not be represented in the wire format
    #[error("Failed to encode value: {0}")]
    Encode(String),

    /// Stored bytes are malformed or do not match the requested type
    #[error("Failed to decode value: {0}")]
    Decode(String),

    /// A tier's backing service could not be reached
    #[error("{tier} tier unavailable: {reason}")]
    TierUnavailable { tier: &'static str, reason: String },

    /// A remote operation exceeded its configured timeout
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Error reported by the Redis client
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The local admission policy declined to store the entry.
    ///
    /// Observable only: the facade never reports this as a failed `set`.
    #[error("Admission rejected for key '{key}' (cost {cost})")]
    AdmissionRejected { key: String, cost: u64 },

    /// Neither tier accepted a write
    #[error("Failed to store value: {local}{}", .remote.as_ref().map(|e| format!(" (remote: {e})")).unwrap_or_default())]
    StoreFailed {
        remote: Option<Box<CacheError>>,
        local: Box<CacheError>,
    },

    /// One or more tiers failed to release their resources
    #[error("Failed to close cache: {}", join_errors(.0))]
    CloseFailed(Vec<CacheError>),
}

impl CacheError {
    /// Shorthand for a [`CacheError::TierUnavailable`] on the remote tier.
    pub fn remote_unavailable(reason: impl Into<String>) -> Self {
        CacheError::TierUnavailable {
            tier: "redis",
            reason: reason.into(),
        }
    }

    /// Returns true for failures worth retrying on a fresh connection.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Timeout { .. } | CacheError::TierUnavailable { .. } => true,
            CacheError::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
            }
            _ => false,
        }
    }
}

fn join_errors(errors: &[CacheError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
