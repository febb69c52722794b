//! Configuration Module
//!
//! Describes the pools a registry serves: which store kind backs each
//! named pool, its lifetime policy, namespace, and optional pinned
//! version, plus process-wide store settings. Loads from environment
//! variables or deserializes from any serde source.

use std::collections::{HashMap, HashSet};
use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::legacy;

/// Name of the pool whose configuration serves as the fallback for any
/// unconfigured, non-strict pool name.
pub const DEFAULT_POOL: &str = "default";

// == Adapter Kind ==
/// Supported backing-store kinds, a closed set resolved at
/// configuration-load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// The registry's shared in-process store
    Memory,
    /// Discards writes, misses reads: caching disabled for the pool
    Null,
}

impl Default for AdapterKind {
    fn default() -> Self {
        AdapterKind::Memory
    }
}

// == Pool Configuration ==
/// Configuration of one named pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Store kind serving this pool
    pub adapter: AdapterKind,
    /// Seconds before items without an explicit expiration expire, 0 = never
    pub default_lifetime: u64,
    /// Namespace override; the pool's own name is used when absent
    pub namespace: Option<String>,
    /// Deployment version to pin the namespace to
    pub version: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterKind::Memory,
            default_lifetime: 0,
            namespace: None,
            version: None,
        }
    }
}

// == Registry Configuration ==
/// Process-wide cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of entries in the shared memory store, None = unbounded
    pub max_entries: Option<usize>,
    /// Janitor sweep interval in seconds
    pub cleanup_interval: u64,
    /// Per-pool configuration, keyed by pool name
    pub pools: HashMap<String, PoolConfig>,
    /// Pool names that must be configured explicitly: no fallback to the
    /// default pool, requesting them unconfigured is an error
    pub strict: HashSet<String>,
}

impl Config {
    /// Creates a Config from environment variables, starting from the
    /// defaults.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - shared store capacity, 0 = unbounded (default: 1000)
    /// - `CACHE_DEFAULT_TTL` - default pool lifetime in seconds (default: 300)
    /// - `CACHE_CLEANUP_INTERVAL` - janitor interval in seconds (default: 1)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(max) = env::var("CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.max_entries = if max == 0 { None } else { Some(max) };
        }
        if let Some(lifetime) = env::var("CACHE_DEFAULT_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            if let Some(pool) = config.pools.get_mut(DEFAULT_POOL) {
                pool.default_lifetime = lifetime;
            }
        }
        if let Some(interval) = env::var("CACHE_CLEANUP_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.cleanup_interval = interval;
        }
        config
    }

    /// Adds or replaces the configuration of one pool.
    pub fn with_pool(mut self, name: &str, pool: PoolConfig) -> Self {
        self.pools.insert(name.to_string(), pool);
        self
    }

    /// Marks a pool name as strict.
    pub fn mark_strict(mut self, name: &str) -> Self {
        self.strict.insert(name.to_string());
        self
    }

    /// Resolves the configuration for a pool name, falling back to the
    /// default pool's unless the name is strict.
    pub fn resolve(&self, name: &str) -> Result<&PoolConfig> {
        if let Some(pool) = self.pools.get(name) {
            return Ok(pool);
        }
        if self.strict.contains(name) {
            return Err(CacheError::Configuration(format!(
                "pool {:?} is strict and has no configuration",
                name
            )));
        }
        self.pools.get(DEFAULT_POOL).ok_or_else(|| {
            CacheError::Configuration(format!(
                "no configuration for pool {:?} and no {:?} fallback",
                name, DEFAULT_POOL
            ))
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut pools = HashMap::new();
        pools.insert(
            DEFAULT_POOL.to_string(),
            PoolConfig {
                adapter: AdapterKind::Memory,
                default_lifetime: 300,
                namespace: None,
                version: None,
            },
        );
        // the legacy pool takes arbitrary process-wide keys, so it must
        // be enabled deliberately rather than inherited from the default
        let mut strict = HashSet::new();
        strict.insert(legacy::LEGACY_POOL.to_string());
        Self {
            max_entries: Some(1000),
            cleanup_interval: 1,
            pools,
            strict,
        }
    }
}
