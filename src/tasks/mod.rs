//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache is in
//! service.
//!
//! # Tasks
//! - Janitor: sweeps expired entries out of the shared store at
//!   configured intervals

mod janitor;

pub use janitor::spawn_janitor;
