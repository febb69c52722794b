//! Batch Pipeline
//!
//! The read/write/delete operations of a pool. Reads flush pending
//! deferred saves first so callers always observe their own writes.
//! Commits group deferred items into TTL buckets, issue one bulk write
//! per bucket, and retry failed identifiers individually before
//! reporting overall failure.
//!
//! Backing-store errors never escape these methods: reads degrade to a
//! miss and writes to a `false` result, with the failure logged.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, warn};

use super::Pool;
use crate::error::Result;
use crate::item::{now_secs_f64, Item};
use crate::store::StoredValue;

// == Items Iterator ==
/// Single-pass sequence of `(key, item)` pairs returned by `get_items`,
/// in request order.
#[derive(Debug)]
pub struct Items {
    inner: std::vec::IntoIter<(String, Item)>,
}

impl Items {
    fn new(items: Vec<(String, Item)>) -> Self {
        Self {
            inner: items.into_iter(),
        }
    }
}

impl Iterator for Items {
    type Item = (String, Item);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Items {}

impl Pool {
    // == Reads ==
    /// Returns true when an unexpired value is stored for `key`.
    pub fn has_item(&mut self, key: &str) -> Result<bool> {
        let id = self.resolve_id(key)?;
        if self.deferred.contains_key(key) {
            self.commit();
        }
        match self.store.exists(&id) {
            Ok(found) => Ok(found),
            Err(err) => {
                warn!("Failed to check if key {:?} is cached: {}", key, err);
                Ok(false)
            }
        }
    }

    /// Fetches the item stored for `key`; a miss carries `Value::Null`
    /// and `is_hit() == false`.
    pub fn get_item(&mut self, key: &str) -> Result<Item> {
        if !self.deferred.is_empty() {
            self.commit();
        }
        let id = self.resolve_id(key)?;
        let stored = match self.store.fetch_many(std::slice::from_ref(&id)) {
            Ok(mut found) => found.remove(&id),
            Err(err) => {
                warn!("Failed to fetch key {:?}: {}", key, err);
                None
            }
        };
        Ok(Item::from_stored(key, stored, self.default_lifetime))
    }

    /// Fetches many keys in one bulk store call.
    ///
    /// Every requested key yields an item, misses included. A store
    /// failure degrades the whole batch to misses.
    pub fn get_items(&mut self, keys: &[impl AsRef<str>]) -> Result<Items> {
        if !self.deferred.is_empty() {
            self.commit();
        }
        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            let id = self.resolve_id(key)?;
            resolved.push((key.to_string(), id));
        }
        let ids: Vec<String> = resolved.iter().map(|(_, id)| id.clone()).collect();
        let found = match self.store.fetch_many(&ids) {
            Ok(found) => found,
            Err(err) => {
                warn!("Failed to fetch requested items: {}", err);
                HashMap::new()
            }
        };
        let items = resolved
            .into_iter()
            .map(|(key, id)| {
                let item = Item::from_stored(&key, found.get(&id).cloned(), self.default_lifetime);
                (key, item)
            })
            .collect();
        Ok(Items::new(items))
    }

    // == Deletes ==
    /// Removes `key` from the store and from the deferred queue.
    pub fn delete_item(&mut self, key: &str) -> Result<bool> {
        self.delete_items(&[key])
    }

    /// Removes many keys, bulk first, then one by one if the bulk call
    /// is refused. Deletion of an absent key is not a failure.
    pub fn delete_items(&mut self, keys: &[impl AsRef<str>]) -> Result<bool> {
        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            let id = self.resolve_id(key)?;
            self.deferred.remove(key);
            pairs.push((key.to_string(), id));
        }
        let ids: Vec<String> = pairs.iter().map(|(_, id)| id.clone()).collect();
        match self.store.delete_many(&ids) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(err) => debug!("Bulk delete failed, retrying items individually: {}", err),
        }

        let mut ok = true;
        for (key, id) in pairs {
            let deleted = match self.store.delete_many(std::slice::from_ref(&id)) {
                Ok(done) => done,
                Err(_) => false,
            };
            if !deleted {
                warn!("Failed to delete key {:?}", key);
                ok = false;
            }
        }
        Ok(ok)
    }

    // == Writes ==
    /// Persists `item` immediately, flushing anything already deferred.
    pub fn save(&mut self, item: Item) -> bool {
        self.deferred.insert(item.key().to_string(), item);
        self.commit()
    }

    /// Queues `item` for the next commit. A later save for the same key
    /// replaces the queued item.
    pub fn save_deferred(&mut self, item: Item) -> bool {
        self.deferred.insert(item.key().to_string(), item);
        true
    }

    /// Flushes the deferred queue.
    ///
    /// Items are grouped by remaining TTL, already-expired ones are
    /// deleted from the store instead of written. Returns false when at
    /// least one item could not be persisted after the per-item retry.
    pub fn commit(&mut self) -> bool {
        let deferred = std::mem::take(&mut self.deferred);
        if deferred.is_empty() {
            return true;
        }

        let now = now_secs_f64();
        let mut ok = true;
        let mut expired_ids: Vec<String> = Vec::new();
        let mut keys_by_id: HashMap<String, String> = HashMap::new();
        let mut buckets: BTreeMap<u64, HashMap<String, StoredValue>> = BTreeMap::new();

        for (key, item) in deferred {
            let id = match self.resolve_id(&key) {
                Ok(id) => id,
                Err(err) => {
                    warn!("Failed to resolve an identifier for key {:?}: {}", key, err);
                    ok = false;
                    continue;
                }
            };
            let ttl_secs = match item.expiry() {
                None => item.default_lifetime(),
                Some(expiry) => {
                    let remaining = expiry - now;
                    if remaining <= 0.0 {
                        expired_ids.push(id);
                        continue;
                    }
                    // round up so a fresh sub-second remainder is not
                    // mistaken for an expired item
                    remaining.ceil() as u64
                }
            };
            buckets
                .entry(ttl_secs)
                .or_default()
                .insert(id.clone(), item.into_stored(now));
            keys_by_id.insert(id, key);
        }

        if !expired_ids.is_empty() {
            if let Err(err) = self.store.delete_many(&expired_ids) {
                debug!("Failed to delete expired deferred items: {}", err);
            }
        }

        let mut retries: Vec<(u64, Vec<String>)> = Vec::new();
        for (ttl, values) in &buckets {
            match self.store.store_many(values.clone(), *ttl) {
                Ok(failed) if failed.is_empty() => {}
                Ok(failed) => {
                    if values.len() == 1 {
                        for id in failed {
                            ok = false;
                            let type_name = values
                                .get(&id)
                                .map(|v| json_type_name(&v.value))
                                .unwrap_or("unknown");
                            let key = keys_by_id.get(&id).map(String::as_str).unwrap_or(&id);
                            warn!("Failed to save key {:?} ({})", key, type_name);
                        }
                    } else {
                        retries.push((*ttl, failed));
                    }
                }
                Err(err) => {
                    if values.len() == 1 {
                        ok = false;
                        for (id, value) in values {
                            let key = keys_by_id
                                .get(id.as_str())
                                .map(String::as_str)
                                .unwrap_or(id.as_str());
                            warn!(
                                "Failed to save key {:?} ({}): {}",
                                key,
                                json_type_name(&value.value),
                                err
                            );
                        }
                    } else {
                        debug!("Bulk save failed, retrying items individually: {}", err);
                        retries.push((*ttl, values.keys().cloned().collect()));
                    }
                }
            }
        }

        // When a bulk save failed, retry each item individually
        for (ttl, ids) in retries {
            for id in ids {
                let value = match buckets.get(&ttl).and_then(|bucket| bucket.get(&id)) {
                    Some(value) => value.clone(),
                    None => continue,
                };
                let single = HashMap::from([(id.clone(), value.clone())]);
                let saved = match self.store.store_many(single, ttl) {
                    Ok(failed) => failed.is_empty(),
                    Err(_) => false,
                };
                if !saved {
                    ok = false;
                    let key = keys_by_id.get(&id).map(String::as_str).unwrap_or(&id);
                    warn!("Failed to save key {:?} ({})", key, json_type_name(&value.value));
                }
            }
        }

        ok
    }
}

/// Human-readable JSON type label for save-failure logs.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
