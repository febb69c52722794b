//! Legacy Flat-Cache Facade
//!
//! Compatibility layer for call sites written against the old flat
//! cache API: arbitrary strings as keys, no namespaces, plain
//! store/fetch/delete semantics. Every call maps 1:1 onto the
//! `legacy_flat` pool after hashing the caller's key into a pool-safe
//! one, so keys containing reserved characters never reach key
//! validation.
//!
//! The pool is strict: it serves nothing until the host application
//! configures it explicitly.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::item::Item;
use crate::registry::CacheRegistry;

/// Name of the pool backing the flat API. Strict by default, see
/// `Config::default`.
pub const LEGACY_POOL: &str = "legacy_flat";

/// Normalizes an arbitrary legacy key into a fixed-length pool-safe one.
fn flat_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn apply_ttl(item: &mut Item, ttl_secs: u64) -> Result<()> {
    if ttl_secs > 0 {
        item.expires_after(Some(chrono::Duration::seconds(ttl_secs as i64)))?;
    } else {
        // legacy callers pass 0 for "no explicit ttl"
        item.expires_after(None)?;
    }
    Ok(())
}

// == Writes ==
/// Stores a value under a legacy key. `ttl_secs` of 0 falls back to the
/// pool's default lifetime.
pub fn store<T: Serialize>(
    registry: &mut CacheRegistry,
    key: &str,
    value: T,
    ttl_secs: u64,
) -> Result<bool> {
    let pool = registry.pool(LEGACY_POOL)?;
    let mut item = pool.get_item(&flat_key(key))?;
    item.set(value)?;
    apply_ttl(&mut item, ttl_secs)?;
    Ok(pool.save(item))
}

/// Stores many values in one commit, sharing a TTL.
pub fn store_many(
    registry: &mut CacheRegistry,
    entries: &[(String, Value)],
    ttl_secs: u64,
) -> Result<bool> {
    let pool = registry.pool(LEGACY_POOL)?;
    let keys: Vec<String> = entries.iter().map(|(key, _)| flat_key(key)).collect();
    let items = pool.get_items(&keys)?;
    for ((_, value), (_, mut item)) in entries.iter().zip(items) {
        item.set_value(value.clone());
        apply_ttl(&mut item, ttl_secs)?;
        pool.save_deferred(item);
    }
    Ok(pool.commit())
}

// == Reads ==
/// Fetches the value stored under a legacy key, None on a miss.
pub fn fetch(registry: &mut CacheRegistry, key: &str) -> Result<Option<Value>> {
    let item = registry.pool(LEGACY_POOL)?.get_item(&flat_key(key))?;
    Ok(if item.is_hit() {
        Some(item.into_value())
    } else {
        None
    })
}

/// Fetches many legacy keys at once. Every requested key is present in
/// the result, misses mapped to None.
pub fn fetch_many(
    registry: &mut CacheRegistry,
    keys: &[String],
) -> Result<HashMap<String, Option<Value>>> {
    let pool = registry.pool(LEGACY_POOL)?;
    let hashed: Vec<String> = keys.iter().map(|key| flat_key(key)).collect();
    let items = pool.get_items(&hashed)?;
    Ok(keys
        .iter()
        .zip(items)
        .map(|(key, (_, item))| {
            let value = if item.is_hit() {
                Some(item.into_value())
            } else {
                None
            };
            (key.clone(), value)
        })
        .collect())
}

/// Returns true when an unexpired value is stored under a legacy key.
pub fn exists(registry: &mut CacheRegistry, key: &str) -> Result<bool> {
    registry.pool(LEGACY_POOL)?.has_item(&flat_key(key))
}

// == Invalidation ==
/// Removes a legacy key. True unless the removal failed; absent keys
/// count as removed.
pub fn delete(registry: &mut CacheRegistry, key: &str) -> Result<bool> {
    registry.pool(LEGACY_POOL)?.delete_item(&flat_key(key))
}

/// Removes many legacy keys at once.
pub fn delete_many(registry: &mut CacheRegistry, keys: &[String]) -> Result<bool> {
    let pool = registry.pool(LEGACY_POOL)?;
    let hashed: Vec<String> = keys.iter().map(|key| flat_key(key)).collect();
    pool.delete_items(&hashed)
}

/// Drops everything the legacy API ever stored.
pub fn clear(registry: &mut CacheRegistry) -> Result<bool> {
    Ok(registry.pool(LEGACY_POOL)?.clear())
}
