//! Identifier Derivation
//!
//! Maps a logical key onto the physical identifier handed to the backing
//! store: `namespace + version + key`. Keys that would push the
//! identifier past the store's length limit are replaced by a truncated
//! hash, sized so the final identifier fits whatever the current version
//! segment is.

use sha2::{Digest, Sha256};
use tracing::debug;

use super::Pool;
use crate::error::Result;
use crate::item::validate_key;

impl Pool {
    /// Resolves the physical identifier for `key`.
    ///
    /// The first resolution on a versioned pool reads the version record;
    /// an absent or unreadable record means version `"1/"`. Key segments
    /// are memoized until the version changes.
    pub(crate) fn resolve_id(&mut self, key: &str) -> Result<String> {
        if self.versioning_enabled && self.namespace_version.is_empty() {
            self.id_cache.clear();
            self.namespace_version = "1/".to_string();
            let record_id = self.version_record_id();
            match self.store.fetch_many(std::slice::from_ref(&record_id)) {
                Ok(found) => {
                    if let Some(version) = found.get(&record_id).and_then(|s| s.value.as_str()) {
                        self.namespace_version = version.to_string();
                    }
                }
                Err(err) => {
                    debug!("Failed to read the namespace version record: {}", err);
                }
            }
        }

        if let Some(segment) = self.id_cache.get(key) {
            return Ok(format!(
                "{}{}{}",
                self.namespace, self.namespace_version, segment
            ));
        }
        validate_key(key)?;

        let over_limit = self.store.max_id_length().map_or(false, |max| {
            self.namespace.len() + self.namespace_version.len() + key.len() > max
        });
        let segment = if over_limit {
            hashed_segment(key, self.namespace_version.len())
        } else {
            key.to_string()
        };
        let id = format!("{}{}{}", self.namespace, self.namespace_version, segment);
        self.id_cache.insert(key.to_string(), segment);
        Ok(id)
    }
}

/// Fixed-length stand-in for an oversized key: a truncated hash, favoring
/// speed and stability over collision resistance, sized so the composed
/// identifier length never depends on the key.
fn hashed_segment(key: &str, version_len: usize) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let keep = 22usize.saturating_sub(version_len);
    format!("{}:", &digest[..keep])
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::store::{MemoryStore, NullStore, Store, StoredValue, MAX_ID_LENGTH};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn memory_pool(namespace: &str) -> Pool {
        Pool::new(Arc::new(MemoryStore::new(None)), namespace, 0).unwrap()
    }

    #[test]
    fn test_plain_identifier_composition() {
        let mut pool = memory_pool("app");
        assert_eq!(pool.resolve_id("user.42").unwrap(), "app:user.42");

        let mut bare = memory_pool("");
        assert_eq!(bare.resolve_id("user.42").unwrap(), "user.42");
    }

    #[test]
    fn test_versioned_identifier_defaults_to_one() {
        let mut pool = memory_pool("app");
        pool.enable_versioning(true);
        assert_eq!(pool.resolve_id("k").unwrap(), "app:1/k");
    }

    #[test]
    fn test_versioned_identifier_adopts_stored_record() {
        let store = Arc::new(MemoryStore::new(None));
        store
            .store_many(
                HashMap::from([("/app:".to_string(), StoredValue::bare(json!("7/")))]),
                0,
            )
            .unwrap();

        let mut pool = Pool::new(store, "app", 0).unwrap();
        pool.enable_versioning(true);
        assert_eq!(pool.resolve_id("k").unwrap(), "app:7/k");
    }

    #[test]
    fn test_invalid_keys_are_rejected() {
        let mut pool = memory_pool("app");
        for bad in ["", "a/b", "a@b", "a:b", "a{b}"] {
            assert!(
                matches!(pool.resolve_id(bad), Err(CacheError::InvalidKey(_))),
                "key {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_long_keys_hash_to_bounded_identifiers() {
        let mut pool = memory_pool("app");
        let long = "k".repeat(MAX_ID_LENGTH * 2);

        let id = pool.resolve_id(&long).unwrap();
        assert_eq!(id.len(), "app:".len() + 23);
        assert!(id.starts_with("app:"));
        assert!(id.ends_with(':'));

        // memoized resolution is stable
        assert_eq!(pool.resolve_id(&long).unwrap(), id);

        // distinct long keys stay distinct
        let other = "x".repeat(MAX_ID_LENGTH * 2);
        assert_ne!(pool.resolve_id(&other).unwrap(), id);
    }

    #[test]
    fn test_hashed_segment_absorbs_version_length() {
        let mut pool = memory_pool("app");
        pool.enable_versioning(true);
        let long = "k".repeat(MAX_ID_LENGTH * 2);

        // namespace + version + segment stays at the unversioned length
        let id = pool.resolve_id(&long).unwrap();
        assert_eq!(id.len(), "app:".len() + 23);
        assert!(id.starts_with("app:1/"));
    }

    #[test]
    fn test_stores_without_length_limit_keep_raw_keys() {
        let mut pool = Pool::new(Arc::new(NullStore), "app", 0).unwrap();
        let long = "k".repeat(MAX_ID_LENGTH * 2);
        let id = pool.resolve_id(&long).unwrap();
        assert_eq!(id, format!("app:{}", long));
    }

    #[test]
    fn test_version_bump_discards_memoized_segments() {
        let mut pool = memory_pool("app");
        pool.enable_versioning(true);
        assert_eq!(pool.resolve_id("k").unwrap(), "app:1/k");

        assert!(pool.clear());
        assert_eq!(pool.resolve_id("k").unwrap(), "app:2/k");
    }

    #[test]
    fn test_hashed_segment_length_tracks_version() {
        assert_eq!(hashed_segment("key", 0).len(), 23);
        assert_eq!(hashed_segment("key", 2).len(), 21);
        assert_ne!(hashed_segment("key-a", 0), hashed_segment("key-b", 0));
    }
}
