//! Cache Registry Module
//!
//! Owns the process-wide store and lock registry and hands out pools by
//! name according to the loaded configuration. Pools are created lazily
//! on first request and memoized, so repeated lookups of the same name
//! return the same pool with its deferred queue and version intact.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::{AdapterKind, Config};
use crate::error::Result;
use crate::pool::{LockRegistry, Pool};
use crate::store::{MemoryStore, NullStore, Store};

/// Factory and owner of every named pool in the process.
pub struct CacheRegistry {
    config: Config,
    store: Arc<MemoryStore>,
    locks: Arc<LockRegistry>,
    pools: HashMap<String, Pool>,
}

impl CacheRegistry {
    /// Creates a registry, building the shared memory store from the
    /// configured capacity.
    pub fn new(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new(config.max_entries));
        Self {
            config,
            store,
            locks: Arc::new(LockRegistry::new()),
            pools: HashMap::new(),
        }
    }

    /// Returns the pool registered under `name`, creating it on first
    /// request.
    ///
    /// Unconfigured names fall back to the default pool's configuration
    /// with the requested name as namespace, unless marked strict in the
    /// configuration.
    pub fn pool(&mut self, name: &str) -> Result<&mut Pool> {
        match self.pools.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let pool_config = self.config.resolve(name)?;
                let namespace = pool_config
                    .namespace
                    .clone()
                    .unwrap_or_else(|| name.to_string());
                let store: Arc<dyn Store> = match pool_config.adapter {
                    AdapterKind::Memory => self.store.clone(),
                    AdapterKind::Null => Arc::new(NullStore),
                };
                let mut pool = Pool::with_lock_registry(
                    store,
                    &namespace,
                    pool_config.default_lifetime,
                    self.locks.clone(),
                )?;
                if let Some(version) = &pool_config.version {
                    pool.pin_version(version)?;
                }
                debug!("Opened pool {:?} with namespace {:?}", name, namespace);
                Ok(entry.insert(pool))
            }
        }
    }

    /// Shared in-process store backing every memory pool.
    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    /// The configuration this registry was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::error::CacheError;
    use serde_json::json;

    #[test]
    fn test_pool_is_memoized() {
        let mut registry = CacheRegistry::new(Config::default());

        let mut item = registry.pool("app").unwrap().get_item("k").unwrap();
        item.set_value(json!(1));
        assert!(registry.pool("app").unwrap().save_deferred(item));

        // same pool instance again, deferred queue intact
        assert!(registry.pool("app").unwrap().commit());
        assert!(registry.pool("app").unwrap().get_item("k").unwrap().is_hit());
    }

    #[test]
    fn test_unconfigured_pool_uses_default_config_and_own_namespace() {
        let mut registry = CacheRegistry::new(Config::default());

        let mut item = registry.pool("sessions").unwrap().get_item("k").unwrap();
        item.set_value(json!("s"));
        assert!(registry.pool("sessions").unwrap().save(item));

        assert!(registry.store().raw_get("sessions:k").is_some());
    }

    #[test]
    fn test_strict_pool_without_configuration_is_an_error() {
        let mut registry = CacheRegistry::new(Config::default().mark_strict("payments"));
        assert!(matches!(
            registry.pool("payments"),
            Err(CacheError::Configuration(_))
        ));
    }

    #[test]
    fn test_null_pool_discards_writes() {
        let config = Config::default().with_pool(
            "disabled",
            PoolConfig {
                adapter: AdapterKind::Null,
                ..PoolConfig::default()
            },
        );
        let mut registry = CacheRegistry::new(config);

        let mut item = registry.pool("disabled").unwrap().get_item("k").unwrap();
        item.set_value(json!(42));
        assert!(registry.pool("disabled").unwrap().save(item));
        assert!(!registry.pool("disabled").unwrap().get_item("k").unwrap().is_hit());
        assert!(registry.store().is_empty());
    }

    #[test]
    fn test_configured_version_is_pinned_on_first_open() {
        let config = Config::default().with_pool(
            "app",
            PoolConfig {
                version: Some("v3".to_string()),
                ..PoolConfig::default()
            },
        );
        let mut registry = CacheRegistry::new(config);
        registry.pool("app").unwrap();

        assert!(registry.store().raw_get("v3@app:").is_some());
    }

    #[test]
    fn test_pools_are_isolated_by_namespace() {
        let mut registry = CacheRegistry::new(Config::default());

        let mut item = registry.pool("users").unwrap().get_item("42").unwrap();
        item.set_value(json!("alice"));
        registry.pool("users").unwrap().save(item);

        assert!(!registry.pool("orders").unwrap().get_item("42").unwrap().is_hit());
        assert!(registry.pool("users").unwrap().get_item("42").unwrap().is_hit());
    }
}
