//! Sync watermarks
//!
//! Per-table boundary up to which remote changes have been pulled. Stored in
//! the cache without expiry under `{table}_last_sync`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheStore, GetOptions, SetOptions};
use crate::error::CacheError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncWatermark {
    pub table: String,
    /// `None` until the first successful pull
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Appended to a table name to form its watermark key
pub const WATERMARK_SUFFIX: &str = "_last_sync";

pub fn watermark_key(table: &str) -> String {
    format!("{}{}", table, WATERMARK_SUFFIX)
}

pub fn load(cache: &mut CacheStore, table: &str) -> Result<Option<DateTime<Utc>>, CacheError> {
    cache.get(&watermark_key(table), GetOptions::default())
}

/// Advances the watermark of `table` to `at`. Never moves it backwards.
///
/// Returns the watermark in effect afterwards.
pub fn commit(
    cache: &mut CacheStore,
    table: &str,
    at: DateTime<Utc>,
) -> Result<DateTime<Utc>, CacheError> {
    match load(cache, table)? {
        Some(current) if current >= at => Ok(current),
        _ => {
            cache.set(&watermark_key(table), &at, SetOptions::persistent())?;
            Ok(at)
        }
    }
}

/// Forgets the watermark so the next pull starts from the beginning.
pub fn reset(cache: &mut CacheStore, table: &str) -> Result<(), CacheError> {
    cache.remove(&watermark_key(table))
}

/// Current watermarks of `tables`.
pub fn snapshot(cache: &mut CacheStore, tables: &[String]) -> Result<Vec<SyncWatermark>, CacheError> {
    tables
        .iter()
        .map(|table| {
            Ok(SyncWatermark {
                table: table.clone(),
                last_synced_at: load(cache, table)?,
            })
        })
        .collect()
}
