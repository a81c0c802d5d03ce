//! Cache Module
//!
//! Provides a namespaced key/value cache with lazy TTL expiration.

mod entry;
mod stats;
mod storage;
mod store;

#[cfg(test)]
mod property_tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

// Re-export public types
pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{CacheStore, Expiry, GetOptions, SetOptions};

/// Cache handle shared by the queue, the sync engine and the API.
pub type SharedCache = Arc<RwLock<CacheStore>>;

// == Public Constants ==
/// Namespace prefix for cache keys
pub const DEFAULT_PREFIX: &str = "aurora_";

/// TTL for entries stored without an explicit one
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Wraps a store for sharing.
pub fn shared(store: CacheStore) -> SharedCache {
    Arc::new(RwLock::new(store))
}
