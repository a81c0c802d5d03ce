//! Cache Store Module
//!
//! Main cache engine: namespaced keys over a storage backend with lazy TTL
//! expiration. There is no background eviction; expiry is observed on read.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStats, MemoryStorage, Storage, DEFAULT_PREFIX, DEFAULT_TTL};
use crate::clock::{SharedClock, SystemClock};
use crate::error::CacheError;

// == Options ==
/// How long a stored value stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Use the store's default TTL
    #[default]
    Default,
    /// Expire after the given duration
    After(Duration),
    /// Never expire
    Never,
}

/// Options for [`CacheStore::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub expiry: Expiry,
}

impl SetOptions {
    /// Expire after `ttl`.
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            expiry: Expiry::After(ttl),
        }
    }

    /// Never expire. Used for durable state such as the mutation queue.
    pub fn persistent() -> Self {
        Self {
            expiry: Expiry::Never,
        }
    }
}

/// Options for [`CacheStore::get`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Evict and report a miss regardless of remaining TTL
    pub force_refresh: bool,
}

impl GetOptions {
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

// == Cache Store ==
/// TTL key/value cache over a pluggable storage backend.
#[derive(Debug)]
pub struct CacheStore {
    /// Persistence backend, possibly shared with foreign keys
    storage: Box<dyn Storage>,
    /// Time source for TTL checks
    clock: SharedClock,
    /// Namespace prefix prepended to every key
    prefix: String,
    /// TTL applied when a set does not specify one
    default_ttl: Duration,
    /// Performance statistics
    stats: CacheStats,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `storage` - Persistence backend
    /// * `clock` - Time source used for TTL checks
    /// * `prefix` - Namespace prefix for keys
    /// * `default_ttl` - TTL for entries stored with [`Expiry::Default`]
    pub fn new(
        storage: Box<dyn Storage>,
        clock: SharedClock,
        prefix: impl Into<String>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            prefix: prefix.into(),
            default_ttl,
            stats: CacheStats::new(),
        }
    }

    /// Creates an in-memory store with the system clock and default namespace.
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryStorage::new()),
            Arc::new(SystemClock),
            DEFAULT_PREFIX,
            DEFAULT_TTL,
        )
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    // == Set ==
    /// Stores a value under `key`, overwriting any previous entry and
    /// restarting its TTL.
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(value).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.set_value(key, value, options)
    }

    /// Stores an already-built JSON value.
    pub fn set_value(
        &mut self,
        key: &str,
        value: Value,
        options: SetOptions,
    ) -> Result<(), CacheError> {
        let ttl_ms = match options.expiry {
            Expiry::Default => Some(self.default_ttl.as_millis() as u64),
            Expiry::After(ttl) => Some(ttl.as_millis() as u64),
            Expiry::Never => None,
        };

        let entry = CacheEntry::new(value, self.clock.now_ms(), ttl_ms);
        let raw = serde_json::to_string(&entry).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;

        let storage_key = self.storage_key(key);
        self.storage.set_item(&storage_key, raw)
    }

    // == Get ==
    /// Retrieves and decodes the value stored under `key`.
    ///
    /// Returns `Ok(None)` on a miss: absent key, expired entry, forced refresh,
    /// or an entry that no longer decodes as `T`. Every miss except an absent
    /// key evicts the entry.
    pub fn get<T: DeserializeOwned>(
        &mut self,
        key: &str,
        options: GetOptions,
    ) -> Result<Option<T>, CacheError> {
        let Some(value) = self.get_value(key, options)? else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                warn!("Evicting cache entry '{}' with unexpected shape: {}", key, e);
                let storage_key = self.storage_key(key);
                self.storage.remove_item(&storage_key)?;
                // Undo the hit recorded by get_value
                self.stats.hits = self.stats.hits.saturating_sub(1);
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    /// Retrieves the raw JSON value stored under `key`.
    pub fn get_value(&mut self, key: &str, options: GetOptions) -> Result<Option<Value>, CacheError> {
        let storage_key = self.storage_key(key);

        if options.force_refresh {
            self.storage.remove_item(&storage_key)?;
            self.stats.record_miss();
            return Ok(None);
        }

        let Some(raw) = self.storage.get_item(&storage_key)? else {
            self.stats.record_miss();
            return Ok(None);
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Evicting unreadable cache entry '{}': {}", key, e);
                self.storage.remove_item(&storage_key)?;
                self.stats.record_miss();
                return Ok(None);
            }
        };

        if entry.is_expired(self.clock.now_ms()) {
            debug!("Cache entry '{}' expired", key);
            self.storage.remove_item(&storage_key)?;
            self.stats.record_expiration();
            return Ok(None);
        }

        self.stats.record_hit();
        Ok(Some(entry.value))
    }

    // == Remove ==
    /// Removes an entry. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        let storage_key = self.storage_key(key);
        self.storage.remove_item(&storage_key)
    }

    // == Clear ==
    /// Removes every entry under the namespace, leaving foreign keys untouched.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&mut self) -> Result<usize, CacheError> {
        let owned: Vec<String> = self
            .storage
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(&self.prefix))
            .collect();

        for key in &owned {
            self.storage.remove_item(key)?;
        }

        Ok(owned.len())
    }

    // == Keys ==
    /// Returns the (unprefixed) keys currently stored, expired or not.
    pub fn keys(&self) -> Vec<String> {
        self.storage
            .keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.len());
        stats
    }

    /// Returns the number of stored entries under the namespace.
    pub fn len(&self) -> usize {
        self.storage
            .keys()
            .iter()
            .filter(|k| k.starts_with(&self.prefix))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Time source used by this store.
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }
}
