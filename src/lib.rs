//! Cachepool - A namespaced, versioned cache-pool layer
//!
//! Pools hand out items keyed by validated strings, defer writes into
//! TTL-bucketed batch commits, clear whole namespaces in O(1) through
//! version records, and guard expensive recomputations with
//! probabilistic early expiration plus single-flight locking.

pub mod config;
pub mod error;
pub mod item;
pub mod legacy;
pub mod pool;
pub mod registry;
pub mod store;
pub mod tasks;

pub use config::{AdapterKind, Config, PoolConfig, DEFAULT_POOL};
pub use error::{CacheError, Result};
pub use item::{Item, Metadata};
pub use pool::{Items, LockRegistry, Pool};
pub use registry::CacheRegistry;
pub use store::{MemoryStore, NullStore, Store, StoredValue};
pub use tasks::spawn_janitor;
