//! In-Process Memory Store
//!
//! The default backing store: a shared map with TTL expiration, optional
//! LRU-bounded capacity, per-value size limits, and usage statistics.
//!
//! Intended to be held behind an `Arc` and shared by every pool in a
//! process; interior locking keeps it `Sync`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::store::{
    LruTracker, Store, StoreEntry, StoreError, StoreStats, StoredValue, MAX_ID_LENGTH,
    MAX_VALUE_SIZE,
};

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, StoreEntry>,
    lru: LruTracker,
    stats: StoreStats,
}

// == Memory Store ==
/// Shared in-process key/value store with TTL and LRU eviction.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
    /// Maximum number of entries, None = unbounded
    max_entries: Option<usize>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` entries (`None` for
    /// no bound). At capacity, the least recently used entry is evicted
    /// to make room.
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            inner: RwLock::new(MemoryInner::default()),
            max_entries,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryInner>, StoreError> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryInner>, StoreError> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    // Diagnostics below recover from poisoning instead of failing: the
    // map stays structurally valid even if a writer panicked mid-update.
    fn write_recover(&self) -> RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_recover(&self) -> RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    // == Maintenance ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.write_recover();
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &doomed {
            inner.entries.remove(id);
            inner.lru.remove(id);
            inner.stats.record_expired();
        }
        let live = inner.entries.len();
        inner.stats.set_entries(live);
        doomed.len()
    }

    // == Diagnostics ==
    /// Snapshot of the usage counters.
    pub fn stats(&self) -> StoreStats {
        let inner = self.read_recover();
        let mut stats = inner.stats.clone();
        stats.set_entries(inner.entries.len());
        stats
    }

    /// Current number of entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.read_recover().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a physical slot directly, ignoring expiry, LRU order, and
    /// statistics. Lets tests observe entries that versioned clears have
    /// made unreachable through the pool API.
    pub fn raw_get(&self, id: &str) -> Option<StoredValue> {
        self.read_recover()
            .entries
            .get(id)
            .map(|entry| entry.value.clone())
    }
}

impl Store for MemoryStore {
    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .entries
            .get(id)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false))
    }

    fn fetch_many(&self, ids: &[String]) -> Result<HashMap<String, StoredValue>, StoreError> {
        let mut inner = self.write()?;
        let mut found = HashMap::new();
        for id in ids {
            // None = absent, Some(None) = expired, Some(Some) = live
            let state = inner.entries.get(id).map(|entry| {
                if entry.is_expired() {
                    None
                } else {
                    Some(entry.value.clone())
                }
            });
            match state {
                None => inner.stats.record_miss(),
                Some(None) => {
                    inner.entries.remove(id);
                    inner.lru.remove(id);
                    inner.stats.record_expired();
                    inner.stats.record_miss();
                }
                Some(Some(value)) => {
                    inner.lru.touch(id);
                    inner.stats.record_hit();
                    found.insert(id.clone(), value);
                }
            }
        }
        let live = inner.entries.len();
        inner.stats.set_entries(live);
        Ok(found)
    }

    fn store_many(
        &self,
        values: HashMap<String, StoredValue>,
        ttl_secs: u64,
    ) -> Result<Vec<String>, StoreError> {
        let mut inner = self.write()?;
        let mut failed = Vec::new();

        for (id, stored) in values {
            if id.len() > MAX_ID_LENGTH {
                debug!("Rejected write: identifier exceeds {} bytes", MAX_ID_LENGTH);
                inner.stats.record_failed_write();
                failed.push(id);
                continue;
            }
            let size = match serde_json::to_vec(&stored.value) {
                Ok(bytes) => bytes.len(),
                Err(err) => {
                    debug!("Rejected write for \"{}\": {}", id, err);
                    inner.stats.record_failed_write();
                    failed.push(id);
                    continue;
                }
            };
            if size > MAX_VALUE_SIZE {
                debug!(
                    "Rejected write for \"{}\": value is {} bytes, limit {}",
                    id, size, MAX_VALUE_SIZE
                );
                inner.stats.record_failed_write();
                failed.push(id);
                continue;
            }

            let is_new = !inner.entries.contains_key(&id);
            if is_new {
                if let Some(max) = self.max_entries {
                    if inner.entries.len() >= max {
                        match inner.lru.evict_oldest() {
                            Some(evicted) => {
                                inner.entries.remove(&evicted);
                                inner.stats.record_eviction();
                                debug!("Evicted least recently used entry \"{}\"", evicted);
                            }
                            None => {
                                inner.stats.record_failed_write();
                                failed.push(id);
                                continue;
                            }
                        }
                    }
                }
            }

            inner.entries.insert(id.clone(), StoreEntry::new(stored, ttl_secs));
            inner.lru.touch(&id);
        }

        let live = inner.entries.len();
        inner.stats.set_entries(live);
        Ok(failed)
    }

    fn delete_many(&self, ids: &[String]) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        for id in ids {
            if inner.entries.remove(id).is_some() {
                inner.lru.remove(id);
            }
        }
        let live = inner.entries.len();
        inner.stats.set_entries(live);
        Ok(true)
    }

    fn clear_prefix(&self, prefix: &str) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect();
        for id in &doomed {
            inner.entries.remove(id);
            inner.lru.remove(id);
        }
        let live = inner.entries.len();
        inner.stats.set_entries(live);
        debug!("Purged {} entries under prefix \"{}\"", doomed.len(), prefix);
        Ok(true)
    }

    fn clear_all(&self) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        inner.entries.clear();
        inner.lru.clear();
        inner.stats.set_entries(0);
        Ok(true)
    }

    fn max_id_length(&self) -> Option<usize> {
        Some(MAX_ID_LENGTH)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    fn one(id: &str, value: serde_json::Value) -> HashMap<String, StoredValue> {
        HashMap::from([(id.to_string(), StoredValue::bare(value))])
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_store_and_fetch_roundtrip() {
        let store = MemoryStore::new(None);
        assert!(store.store_many(one("a", json!("v1")), 0).unwrap().is_empty());

        let found = store.fetch_many(&ids(&["a", "missing"])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["a"].value, json!("v1"));
    }

    #[test]
    fn test_fetch_drops_expired_entries() {
        let store = MemoryStore::new(None);
        store.store_many(one("a", json!("v1")), 1).unwrap();
        assert!(store.exists("a").unwrap());

        sleep(Duration::from_millis(1100));
        assert!(!store.exists("a").unwrap());
        assert!(store.fetch_many(&ids(&["a"])).unwrap().is_empty());
        // the lazy removal actually dropped the slot
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().expired, 1);
    }

    #[test]
    fn test_store_many_reports_oversized_values() {
        let store = MemoryStore::new(None);
        let mut values = one("small", json!("ok"));
        values.insert(
            "big".to_string(),
            StoredValue::bare(json!("x".repeat(MAX_VALUE_SIZE + 1))),
        );

        let failed = store.store_many(values, 0).unwrap();
        assert_eq!(failed, vec!["big".to_string()]);
        // the small value was still persisted
        assert!(store.exists("small").unwrap());
        assert!(!store.exists("big").unwrap());
        assert_eq!(store.stats().failed_writes, 1);
    }

    #[test]
    fn test_store_many_rejects_long_identifiers() {
        let store = MemoryStore::new(None);
        let long_id = "x".repeat(MAX_ID_LENGTH + 1);
        let failed = store.store_many(one(&long_id, json!(1)), 0).unwrap();
        assert_eq!(failed, vec![long_id]);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let store = MemoryStore::new(Some(2));
        store.store_many(one("a", json!(1)), 0).unwrap();
        store.store_many(one("b", json!(2)), 0).unwrap();

        // touch "a" so "b" becomes the eviction candidate
        store.fetch_many(&ids(&["a"])).unwrap();
        store.store_many(one("c", json!(3)), 0).unwrap();

        assert!(store.exists("a").unwrap());
        assert!(!store.exists("b").unwrap());
        assert!(store.exists("c").unwrap());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let store = MemoryStore::new(Some(1));
        store.store_many(one("a", json!(1)), 0).unwrap();
        store.store_many(one("a", json!(2)), 0).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().evictions, 0);
        let found = store.fetch_many(&ids(&["a"])).unwrap();
        assert_eq!(found["a"].value, json!(2));
    }

    #[test]
    fn test_delete_many_is_idempotent() {
        let store = MemoryStore::new(None);
        store.store_many(one("a", json!(1)), 0).unwrap();
        assert!(store.delete_many(&ids(&["a", "never-there"])).unwrap());
        assert!(store.delete_many(&ids(&["a"])).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_prefix_spares_other_namespaces() {
        let store = MemoryStore::new(None);
        store.store_many(one("app:1/x", json!(1)), 0).unwrap();
        store.store_many(one("app:1/y", json!(2)), 0).unwrap();
        store.store_many(one("other:1/z", json!(3)), 0).unwrap();

        assert!(store.clear_prefix("app:").unwrap());
        assert!(!store.exists("app:1/x").unwrap());
        assert!(!store.exists("app:1/y").unwrap());
        assert!(store.exists("other:1/z").unwrap());
    }

    #[test]
    fn test_clear_all() {
        let store = MemoryStore::new(None);
        store.store_many(one("a", json!(1)), 0).unwrap();
        store.store_many(one("b", json!(2)), 0).unwrap();
        assert!(store.clear_all().unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_expired_counts_removals() {
        let store = MemoryStore::new(None);
        store.store_many(one("short", json!(1)), 1).unwrap();
        store.store_many(one("long", json!(2)), 60).unwrap();

        sleep(Duration::from_millis(1100));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.exists("long").unwrap());
    }

    #[test]
    fn test_raw_get_ignores_expiry() {
        let store = MemoryStore::new(None);
        store.store_many(one("a", json!("v")), 1).unwrap();
        sleep(Duration::from_millis(1100));

        // still physically present until something removes it
        assert_eq!(store.raw_get("a").unwrap().value, json!("v"));
        assert!(!store.exists("a").unwrap());
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let store = MemoryStore::new(None);
        store.store_many(one("a", json!(1)), 0).unwrap();
        store.fetch_many(&ids(&["a"])).unwrap(); // hit
        store.fetch_many(&ids(&["b"])).unwrap(); // miss

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }
}
