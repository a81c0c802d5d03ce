//! Merge of pulled records into a cached collection.

use tracing::debug;

use crate::models::Record;
use crate::queue::patch;

/// Merges `incoming` into `existing` by record id.
///
/// An incoming record replaces the existing one with the same id and is
/// appended otherwise. Nothing is ever removed. Records without an id cannot
/// be matched and are dropped. Returns the number of records merged.
pub fn merge_records(existing: &mut Vec<Record>, incoming: Vec<Record>) -> usize {
    let mut merged = 0;
    for record in incoming {
        if record.id().is_none() {
            debug!("Dropping pulled record without id");
            continue;
        }
        patch::upsert(existing, record);
        merged += 1;
    }
    merged
}
