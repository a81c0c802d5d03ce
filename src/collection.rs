//! Cached collections
//!
//! The list of records of a table, kept in the cache under the table name.

use crate::cache::{CacheStore, GetOptions, SetOptions};
use crate::error::CacheError;
use crate::models::Record;
use crate::queue::QUEUE_KEY;
use crate::sync::watermark::WATERMARK_SUFFIX;

/// True when a collection stored under `table` would overwrite the queue log
/// or a watermark.
pub fn is_reserved_table(table: &str) -> bool {
    table == QUEUE_KEY || table.ends_with(WATERMARK_SUFFIX)
}

/// Reads the cached records of `table`. `None` when absent or expired.
pub fn load(cache: &mut CacheStore, table: &str) -> Result<Option<Vec<Record>>, CacheError> {
    cache.get(table, GetOptions::default())
}

/// Reads the cached records of `table`, treating a miss as empty.
pub fn load_or_empty(cache: &mut CacheStore, table: &str) -> Result<Vec<Record>, CacheError> {
    Ok(load(cache, table)?.unwrap_or_default())
}

/// Replaces the cached records of `table`. Collections use the default TTL.
pub fn store(cache: &mut CacheStore, table: &str, records: &[Record]) -> Result<(), CacheError> {
    cache.set(table, records, SetOptions::default())
}

/// Drops the cached records of `table`.
pub fn invalidate(cache: &mut CacheStore, table: &str) -> Result<(), CacheError> {
    cache.remove(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_and_load() {
        let mut cache = CacheStore::in_memory();
        let records = vec![Record::from_value(json!({"id": "a"})).unwrap()];

        store(&mut cache, "assets", &records).unwrap();
        assert_eq!(load(&mut cache, "assets").unwrap(), Some(records));
    }

    #[test]
    fn test_missing_collection_is_empty() {
        let mut cache = CacheStore::in_memory();
        assert!(load(&mut cache, "assets").unwrap().is_none());
        assert!(load_or_empty(&mut cache, "assets").unwrap().is_empty());
    }

    #[test]
    fn test_reserved_table_names() {
        assert!(is_reserved_table("offline_changes"));
        assert!(is_reserved_table("assets_last_sync"));
        assert!(!is_reserved_table("assets"));
        assert!(!is_reserved_table("last_sync_log"));
    }

    #[test]
    fn test_invalidate() {
        let mut cache = CacheStore::in_memory();
        store(&mut cache, "assets", &[]).unwrap();
        invalidate(&mut cache, "assets").unwrap();
        assert!(load(&mut cache, "assets").unwrap().is_none());
    }
}
