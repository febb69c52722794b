//! Backing Store Module
//!
//! Defines the capability a cache pool consumes: bulk fetch/store/delete
//! plus prefix or full purge, over opaque physical identifiers. Adapters
//! implement `Store`; pools never touch storage any other way.

mod entry;
mod lru;
mod memory;
mod null;
mod stats;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::item::Metadata;

// Re-export public types
pub use entry::StoreEntry;
pub use lru::LruTracker;
pub use memory::MemoryStore;
pub use null::NullStore;
pub use stats::StoreStats;

// == Public Constants ==
/// Maximum physical identifier length accepted by the in-process store
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum serialized value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB

// == Stored Value ==
/// The envelope a pool hands to the store: the caller's value plus the
/// optional metadata saved alongside it.
///
/// Keeping the metadata in a separate field (instead of sniffing it out of
/// the value's shape) means no caller value can ever be misinterpreted as
/// metadata, however envelope-like it looks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Metadata>,
}

impl StoredValue {
    /// Wraps a value with no metadata.
    pub fn bare(value: Value) -> Self {
        Self { value, meta: None }
    }
}

// == Store Error ==
/// Failure reported by a store adapter.
///
/// These never cross the pool boundary: pools log them and degrade reads
/// to misses and writes to a `false` result.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store's internal lock was poisoned by a panicking writer
    #[error("store lock poisoned")]
    LockPoisoned,

    /// The store could not be reached or refused the whole operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// == Store Capability ==
/// What a cache pool requires from its backing store.
///
/// All operations are keyed by the physical identifiers a pool derives;
/// the store knows nothing about namespaces or versions beyond treating
/// identifiers as opaque prefix-ordered strings.
pub trait Store: Send + Sync {
    /// Returns whether an unexpired entry exists for `id`.
    fn exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Fetches several entries at once; absent or expired identifiers are
    /// simply missing from the result.
    fn fetch_many(&self, ids: &[String]) -> Result<HashMap<String, StoredValue>, StoreError>;

    /// Stores several entries with one shared lifetime (`0` = no expiry).
    ///
    /// Returns the identifiers that could not be stored; an empty list
    /// means full success. `Err` means the whole call failed.
    fn store_many(
        &self,
        values: HashMap<String, StoredValue>,
        ttl_secs: u64,
    ) -> Result<Vec<String>, StoreError>;

    /// Removes several entries; missing identifiers are not an error.
    fn delete_many(&self, ids: &[String]) -> Result<bool, StoreError>;

    /// Purges every entry whose identifier starts with `prefix`.
    fn clear_prefix(&self, prefix: &str) -> Result<bool, StoreError>;

    /// Purges the entire store.
    fn clear_all(&self) -> Result<bool, StoreError>;

    /// Maximum identifier length this store accepts, if it enforces one.
    ///
    /// Pools use this to decide when to fall back to hashed key segments.
    fn max_id_length(&self) -> Option<usize> {
        None
    }
}
