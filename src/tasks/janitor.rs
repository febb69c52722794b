//! Expired-Entry Janitor
//!
//! Expired entries are only dropped lazily when a read touches them, and
//! a versioned `clear` orphans a whole namespace in place. This task is
//! what ultimately reclaims that memory: it sweeps the shared store at a
//! fixed interval and purges every entry whose TTL has passed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::MemoryStore;

/// Spawns a background task that periodically purges expired entries
/// from the shared store.
///
/// The task runs in an infinite loop, sleeping for the specified
/// interval between sweeps.
///
/// # Arguments
/// * `store` - Shared store to sweep
/// * `interval_secs` - Seconds to sleep between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort it
/// during shutdown.
///
/// # Example
/// ```ignore
/// let registry = CacheRegistry::new(Config::from_env());
/// let janitor = spawn_janitor(registry.store(), config.cleanup_interval);
/// // ... serve ...
/// janitor.abort();
/// ```
pub fn spawn_janitor(store: Arc<MemoryStore>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting expired-entry janitor with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = store.purge_expired();
            if removed > 0 {
                info!("Janitor removed {} expired entries", removed);
            } else {
                debug!("Janitor found no expired entries");
            }
        }
    })
}
