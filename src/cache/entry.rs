//! Cache Entry Module
//!
//! Defines the persisted envelope for individual cache entries with TTL support.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// Serialized as `{"data": ..., "timestamp": ..., "ttl": ...}` inside the
/// storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored value
    #[serde(rename = "data")]
    pub value: Value,
    /// Store timestamp (Unix milliseconds)
    #[serde(rename = "timestamp")]
    pub stored_at: i64,
    /// Time to live in milliseconds, None = no expiration
    #[serde(rename = "ttl")]
    pub ttl_ms: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stored at `now_ms` with optional TTL.
    pub fn new(value: Value, now_ms: i64, ttl_ms: Option<u64>) -> Self {
        Self {
            value,
            stored_at: now_ms,
            ttl_ms,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// An entry is stale once strictly more than its TTL has elapsed since it
    /// was stored; an entry read exactly at the TTL boundary is still valid.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.ttl_ms {
            Some(ttl) => {
                let age = now_ms.saturating_sub(self.stored_at);
                age > 0 && age as u64 > ttl
            }
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self, now_ms: i64) -> Option<u64> {
        self.ttl_ms.map(|ttl| {
            let age = now_ms.saturating_sub(self.stored_at).max(0) as u64;
            ttl.saturating_sub(age)
        })
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new(json!("test_value"), 1_000, None);

        assert_eq!(entry.value, json!("test_value"));
        assert!(entry.ttl_ms.is_none());
        assert!(!entry.is_expired(i64::MAX));
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(json!({"a": 1}), 1_000, Some(60_000));

        assert_eq!(entry.stored_at, 1_000);
        assert!(!entry.is_expired(1_000));
        assert!(!entry.is_expired(61_000));
        assert!(entry.is_expired(61_001));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new(json!(1), 500, Some(0));

        // Same millisecond is still fresh, one tick later is stale
        assert!(!entry.is_expired(500));
        assert!(entry.is_expired(501));
    }

    #[test]
    fn test_ttl_remaining_ms() {
        let entry = CacheEntry::new(json!(1), 0, Some(10_000));

        assert_eq!(entry.ttl_remaining_ms(4_000), Some(6_000));
        assert_eq!(entry.ttl_remaining_ms(20_000), Some(0));
        assert!(CacheEntry::new(json!(1), 0, None).ttl_remaining_ms(5).is_none());
    }

    #[test]
    fn test_entry_storage_layout() {
        let entry = CacheEntry::new(json!([1, 2]), 7, Some(300_000));
        let raw = serde_json::to_value(&entry).unwrap();

        assert_eq!(raw, json!({"data": [1, 2], "timestamp": 7, "ttl": 300_000}));
    }
}
