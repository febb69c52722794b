//! Error types for the cache pool layer
//!
//! Provides unified error handling using thiserror.
//!
//! Only caller-input errors cross the pool boundary: bad keys, bad tags,
//! bad expirations, bad configuration, and failures raised by a
//! caller-supplied recompute callback. Backing-store failures never do;
//! they are logged and degrade to a miss (reads) or a `false` result
//! (writes).

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache pool layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is empty or contains reserved characters
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Tag is empty or contains reserved characters
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// Expiration is negative or predates the Unix epoch
    #[error("Invalid expiration: {0}")]
    InvalidExpiration(String),

    /// Value could not be serialized into a cacheable payload
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Pool is missing, misconfigured, or its namespace is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied recompute callback failed; propagated verbatim
    #[error("Compute callback failed: {0}")]
    Compute(anyhow::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache pool layer.
pub type Result<T> = std::result::Result<T, CacheError>;
