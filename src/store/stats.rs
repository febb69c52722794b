//! Store Statistics Module
//!
//! Tracks hit/miss/eviction counters for the in-process store.

use serde::Serialize;

// == Store Stats ==
/// Performance counters for one store instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Successful fetches
    pub hits: u64,
    /// Fetches of absent or expired identifiers
    pub misses: u64,
    /// Entries evicted by the LRU policy
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expired: u64,
    /// Writes refused (oversized value, identifier too long, no room)
    pub failed_writes: u64,
    /// Current number of live entries
    pub entries: usize,
}

impl StoreStats {
    /// Creates stats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hit rate: hits / (hits + misses), or 0.0 before any fetch.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expired(&mut self) {
        self.expired += 1;
    }

    pub fn record_failed_write(&mut self) {
        self.failed_writes += 1;
    }

    pub fn set_entries(&mut self, count: usize) {
        self.entries = count;
    }
}
