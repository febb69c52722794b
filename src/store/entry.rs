//! Store Entry Module
//!
//! Defines one physical slot in the in-process store: the stored envelope
//! plus its creation and expiration timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::store::StoredValue;

// == Store Entry ==
/// A single physical cache slot with TTL support.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The stored envelope (value + optional metadata)
    pub value: StoredValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoreEntry {
    // == Constructor ==
    /// Creates a new entry; `ttl_secs == 0` means the entry never expires.
    pub fn new(value: StoredValue, ttl_secs: u64) -> Self {
        let now = current_timestamp_ms();
        let expires_at = if ttl_secs > 0 {
            Some(now + ttl_secs * 1000)
        } else {
            None
        };

        Self {
            value,
            created_at: now,
            expires_at,
        }
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its expiration
    /// time; entries without one never expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub(crate) fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
