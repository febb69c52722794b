//! Cache Pool Module
//!
//! A pool is a named view over a shared backing store. It owns a key
//! namespace, derives physical identifiers from logical keys, buffers
//! deferred saves, and batches writes by TTL on commit.
//!
//! Pools support two clearing strategies. A plain pool purges its prefix
//! from the store. A versioned pool instead bumps a namespace version
//! record, which re-derives every identifier and orphans the old entries
//! in place until their TTL or the janitor reclaims them.

mod batch;
mod ids;
mod stampede;


pub use batch::Items;
pub use stampede::LockRegistry;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::item::{validate_key, Item};
use crate::store::{Store, StoredValue};

/// Identifier-length headroom reserved for the namespace version and a
/// hashed key segment.
const ID_OVERHEAD: usize = 24;

// == Cache Pool ==
/// Namespaced, versioned view over a backing store.
pub struct Pool {
    store: Arc<dyn Store>,
    locks: Arc<LockRegistry>,
    /// Logical prefix, `""` or `"name:"`
    namespace: String,
    /// Resolved version prefix (`"1/"`, `"2/"`, ...), `""` until first use
    namespace_version: String,
    versioning_enabled: bool,
    default_lifetime: u64,
    /// Items saved with `save_deferred`, keyed by logical key
    deferred: HashMap<String, Item>,
    /// Memoized key segments, cleared whenever the version changes
    id_cache: HashMap<String, String>,
}

impl Pool {
    // == Constructors ==
    /// Creates a pool over `store` with its own lock registry.
    ///
    /// The namespace may be empty (no prefix); otherwise it obeys the same
    /// syntax rules as keys. `default_lifetime` applies to items saved
    /// without an explicit expiration, 0 meaning "never expires".
    pub fn new(store: Arc<dyn Store>, namespace: &str, default_lifetime: u64) -> Result<Self> {
        Self::with_lock_registry(store, namespace, default_lifetime, Arc::new(LockRegistry::new()))
    }

    /// Creates a pool sharing a lock registry with other pools, so that
    /// recomputations for the same (namespace, key) are single-flight
    /// across all of them.
    pub fn with_lock_registry(
        store: Arc<dyn Store>,
        namespace: &str,
        default_lifetime: u64,
        locks: Arc<LockRegistry>,
    ) -> Result<Self> {
        if !namespace.is_empty() {
            validate_key(namespace)?;
        }
        if let Some(max) = store.max_id_length() {
            if namespace.len() > max.saturating_sub(ID_OVERHEAD) {
                return Err(CacheError::Configuration(format!(
                    "namespace must be {} chars max for this store, {} given ({:?})",
                    max.saturating_sub(ID_OVERHEAD),
                    namespace.len(),
                    namespace
                )));
            }
        }
        let namespace = if namespace.is_empty() {
            String::new()
        } else {
            format!("{}:", namespace)
        };
        Ok(Self {
            store,
            locks,
            namespace,
            namespace_version: String::new(),
            versioning_enabled: false,
            default_lifetime,
            deferred: HashMap::new(),
            id_cache: HashMap::new(),
        })
    }

    // == Versioning ==
    /// Enables or disables namespace versioning, returning the previous
    /// setting. The resolved version and the identifier cache are dropped
    /// either way, so the next access re-reads the version record.
    pub fn enable_versioning(&mut self, enable: bool) -> bool {
        let was_enabled = self.versioning_enabled;
        self.versioning_enabled = enable;
        self.namespace_version.clear();
        self.id_cache.clear();
        was_enabled
    }

    /// Pins this pool to a deployment version.
    ///
    /// The first call with a given version purges the namespace and writes
    /// a marker; later calls with the same version find the marker and
    /// leave the cache intact. Deploying a new version therefore starts
    /// from an empty cache exactly once.
    pub fn pin_version(&mut self, version: &str) -> Result<()> {
        validate_key(version)?;
        let marker = format!("{}@{}", version, self.namespace);
        let pinned = self.store.exists(&marker).unwrap_or(false);
        if !pinned {
            if let Err(err) = self.purge_physical() {
                warn!(
                    "Failed to purge namespace {:?} while pinning a new version: {}",
                    self.namespace, err
                );
            }
            let record = HashMap::from([(marker, StoredValue::bare(Value::Null))]);
            if let Err(err) = self.store.store_many(record, 0) {
                warn!("Failed to write the version pin marker: {}", err);
            }
        }
        Ok(())
    }

    // == Clearing ==
    /// Empties the pool, dropping any deferred items first.
    ///
    /// With versioning enabled this bumps the namespace version record and
    /// returns without touching the stored entries; they become
    /// unreachable under the new version and age out on their own. The
    /// physical purge only runs as a fallback when the bump cannot be
    /// written, and always for unversioned pools.
    pub fn clear(&mut self) -> bool {
        self.deferred.clear();

        if self.versioning_enabled {
            let record_id = self.version_record_id();
            let mut counter: u64 = 2;
            match self.store.fetch_many(std::slice::from_ref(&record_id)) {
                Ok(found) => {
                    if let Some(current) = found.get(&record_id).and_then(leading_counter) {
                        counter = current + 1;
                    }
                }
                Err(err) => {
                    debug!("Failed to read the namespace version record: {}", err);
                }
            }
            let version = format!("{}/", counter);
            let record = HashMap::from([(
                record_id,
                StoredValue::bare(Value::String(version.clone())),
            )]);
            match self.store.store_many(record, 0) {
                Ok(failed) if failed.is_empty() => {
                    self.namespace_version = version;
                    self.id_cache.clear();
                    return true;
                }
                Ok(_) => warn!("Failed to bump the namespace version, purging instead"),
                Err(err) => {
                    warn!("Failed to bump the namespace version, purging instead: {}", err);
                }
            }
        }

        match self.purge_physical() {
            Ok(done) => done,
            Err(err) => {
                warn!("Failed to clear the cache: {}", err);
                false
            }
        }
    }

    /// Commits pending deferred items, then forgets the resolved version
    /// and the identifier cache. The next access re-reads the version
    /// record, picking up bumps made by other pools on the same store.
    pub fn reset(&mut self) {
        if !self.deferred.is_empty() {
            self.commit();
        }
        self.namespace_version.clear();
        self.id_cache.clear();
    }

    // == Internals ==
    /// Identifier of the version record for this namespace.
    fn version_record_id(&self) -> String {
        format!("/{}", self.namespace)
    }

    fn purge_physical(&self) -> std::result::Result<bool, crate::store::StoreError> {
        if self.namespace.is_empty() {
            self.store.clear_all()
        } else {
            self.store.clear_prefix(&self.namespace)
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if !self.deferred.is_empty() {
            self.commit();
        }
    }
}

/// Parses the counter out of a version record value ("3/" yields 3).
fn leading_counter(stored: &StoredValue) -> Option<u64> {
    let text = stored.value.as_str()?;
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
