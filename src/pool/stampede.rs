//! Stampede Guard
//!
//! The get-or-compute operation. A hit close to its expiry may be elected
//! for probabilistic early recomputation, weighted by how long the value
//! took to produce and a tunable `beta`, so expensive values refresh
//! before a herd of callers piles onto a hard expiry.
//!
//! Recomputation for one (namespace, key) is single-flight: concurrent
//! callers race for an in-process lock, losers wait bounded time for the
//! winner's value and re-read instead of computing. A waiter whose wait
//! times out recomputes unconditionally so progress never stalls on a
//! stuck winner.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;
use tracing::{info, warn};

use super::Pool;
use crate::error::{CacheError, Result};
use crate::item::{now_secs_f64, Item};

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

// == Lock Registry ==
/// In-process registry of in-flight recomputations, keyed by
/// (namespace, key). Shared across every pool built from one registry so
/// the single-flight guarantee spans pools over the same store.
#[derive(Debug)]
pub struct LockRegistry {
    in_flight: Mutex<HashSet<(String, String)>>,
    released: Condvar,
    wait_timeout: Duration,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::with_wait_timeout(DEFAULT_WAIT_TIMEOUT)
    }

    /// Bounds how long a losing caller waits for the winner before it
    /// recomputes on its own.
    pub fn with_wait_timeout(wait_timeout: Duration) -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            wait_timeout,
        }
    }

    /// Claims (scope, key); false when another caller already holds it.
    fn try_acquire(&self, scope: &str, key: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((scope.to_string(), key.to_string()))
    }

    fn release(&self, scope: &str, key: &str) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        in_flight.remove(&(scope.to_string(), key.to_string()));
        drop(in_flight);
        self.released.notify_all();
    }

    /// Blocks until (scope, key) is released or the timeout elapses.
    fn wait(&self, scope: &str, key: &str) -> WaitOutcome {
        let pair = (scope.to_string(), key.to_string());
        let deadline = Instant::now() + self.wait_timeout;
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while in_flight.contains(&pair) {
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            let (guard, _) = self
                .released
                .wait_timeout(in_flight, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            in_flight = guard;
        }
        WaitOutcome::Completed
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq)]
enum WaitOutcome {
    Completed,
    TimedOut,
}

/// Releases the in-flight claim when the computing caller unwinds,
/// errors included.
struct FlightGuard {
    locks: Arc<LockRegistry>,
    scope: String,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.locks.release(&self.scope, &self.key);
    }
}

/// Verdict on a cached item: serve it, or recompute it.
enum Freshness {
    Fresh(Value),
    Stale(Item, Instant),
}

impl Pool {
    // == Get Or Compute ==
    /// Returns the cached value for `key`, or runs `compute` to produce,
    /// cache, and return it. Equivalent to `get_with_beta(key, 1.0, ..)`.
    ///
    /// `compute` receives the item to fill (its expiry may be adjusted
    /// before saving) and the time already spent since this call decided
    /// to recompute, lock waiting included. A `compute` error propagates
    /// to this caller alone and caches nothing.
    pub fn get<F>(&mut self, key: &str, compute: F) -> Result<Value>
    where
        F: FnOnce(&mut Item, Duration) -> anyhow::Result<Value>,
    {
        self.get_with_beta(key, 1.0, compute)
    }

    /// `get` with an explicit early-expiration factor.
    ///
    /// `beta` 0 disables early recomputation (any hit is served as is),
    /// higher values recompute ever earlier before expiry, and infinity
    /// forces recomputation even on a hit.
    pub fn get_with_beta<F>(&mut self, key: &str, beta: f64, compute: F) -> Result<Value>
    where
        F: FnOnce(&mut Item, Duration) -> anyhow::Result<Value>,
    {
        if beta < 0.0 {
            return Err(CacheError::Configuration(format!(
                "beta must be a non-negative number, {} given",
                beta
            )));
        }

        let (item, started) = match self.judge(key, beta)? {
            Freshness::Fresh(value) => return Ok(value),
            Freshness::Stale(item, started) => (item, started),
        };

        if self.locks.try_acquire(&self.namespace, key) {
            let _flight = FlightGuard {
                locks: Arc::clone(&self.locks),
                scope: self.namespace.clone(),
                key: key.to_string(),
            };
            return self.compute_and_save(item, started, compute);
        }

        match self.locks.wait(&self.namespace, key) {
            // the winner saved (or failed); re-read without the early
            // expiration skew and race for the lock again if still stale
            WaitOutcome::Completed => self.get_with_beta(key, 0.0, compute),
            WaitOutcome::TimedOut => self.compute_and_save(item, started, compute),
        }
    }

    /// Decides whether the stored item can be served or must be
    /// recomputed, applying the probabilistic early-expiration draw.
    fn judge(&mut self, key: &str, beta: f64) -> Result<Freshness> {
        let mut item = self.get_item(key)?;
        let mut recompute = !item.is_hit() || beta == f64::INFINITY;

        if !recompute && beta > 0.0 {
            let meta = item.metadata();
            if let (Some(ctime_ms), Some(expiry)) = (meta.ctime_ms, meta.expiry) {
                let now = now_secs_f64();
                let draw: f64 = 1.0 - rand::thread_rng().gen::<f64>();
                recompute = expiry <= now - ctime_ms as f64 / 1000.0 * beta * draw.ln();
                if recompute {
                    info!(
                        "Item {:?} elected for early recomputation {:.3}s before its expiration",
                        key,
                        expiry - now
                    );
                }
            }
        }

        if recompute {
            // recomputed values fall back to the pool's lifetime policy
            item.expires_at(None)?;
            return Ok(Freshness::Stale(item, Instant::now()));
        }
        Ok(Freshness::Fresh(item.into_value()))
    }

    fn compute_and_save<F>(&mut self, mut item: Item, started: Instant, compute: F) -> Result<Value>
    where
        F: FnOnce(&mut Item, Duration) -> anyhow::Result<Value>,
    {
        let key = item.key().to_owned();
        let value = compute(&mut item, started.elapsed()).map_err(CacheError::Compute)?;

        // creation time covers lock waiting too, so a contended value
        // counts as expensive in later early-expiration draws
        let ctime_ms = ((started.elapsed().as_micros() + 999) / 1000).max(1) as u64;
        item.set_value(value.clone());
        item.record_ctime(ctime_ms);
        if !self.save(item) {
            warn!("Failed to save the recomputed value for key {:?}", key);
        }
        Ok(value)
    }
}
