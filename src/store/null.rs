//! Null Store
//!
//! Discards every write and misses every read. Wiring a pool to this
//! store disables caching for that pool without touching call sites.

use std::collections::HashMap;

use crate::store::{Store, StoreError, StoredValue};

#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl Store for NullStore {
    fn exists(&self, _id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn fetch_many(&self, _ids: &[String]) -> Result<HashMap<String, StoredValue>, StoreError> {
        Ok(HashMap::new())
    }

    fn store_many(
        &self,
        _values: HashMap<String, StoredValue>,
        _ttl_secs: u64,
    ) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }

    fn delete_many(&self, _ids: &[String]) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn clear_prefix(&self, _prefix: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn clear_all(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}
