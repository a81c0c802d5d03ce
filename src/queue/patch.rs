//! Optimistic patches
//!
//! Applies pending mutations to a cached collection so reads reflect local
//! writes before the server acknowledges them. Every patch is keyed by record
//! identity, so applying the same mutation twice is harmless.

use crate::models::Record;
use crate::queue::{MutationPayload, PendingMutation};

/// Applies one mutation to `collection`.
pub fn apply(collection: &mut Vec<Record>, payload: &MutationPayload) {
    match payload {
        MutationPayload::Create { record } => upsert(collection, record.clone()),
        MutationPayload::Update { id, patch } => {
            if let Some(existing) = collection.iter_mut().find(|r| r.id() == Some(id.as_str())) {
                existing.merge_from(patch);
            }
        }
        MutationPayload::Delete { id } => collection.retain(|r| r.id() != Some(id.as_str())),
    }
}

/// Re-applies still-pending mutations of one table, in queue order.
pub fn rebase<'a>(collection: &mut Vec<Record>, pending: impl IntoIterator<Item = &'a PendingMutation>) {
    for mutation in pending {
        apply(collection, &mutation.payload);
    }
}

/// Replaces the record with the same id, or appends it.
pub fn upsert(collection: &mut Vec<Record>, record: Record) {
    let position = record
        .id()
        .and_then(|id| collection.iter().position(|r| r.id() == Some(id)));

    match position {
        Some(index) => collection[index] = record,
        None => collection.push(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_create_appends_and_is_idempotent() {
        let mut collection = vec![record(json!({"id": "a"}))];
        let create = MutationPayload::Create {
            record: record(json!({"id": "b", "description": "X"})),
        };

        apply(&mut collection, &create);
        apply(&mut collection, &create);

        assert_eq!(collection.len(), 2);
        assert_eq!(collection[1].get("description"), Some(&json!("X")));
    }

    #[test]
    fn test_update_shallow_merges() {
        let mut collection = vec![record(json!({"id": "a", "amount": 1, "category": "legal"}))];
        apply(
            &mut collection,
            &MutationPayload::Update {
                id: "a".to_string(),
                patch: record(json!({"amount": 7})),
            },
        );

        assert_eq!(
            collection[0].clone().into_value(),
            json!({"id": "a", "amount": 7, "category": "legal"})
        );
    }

    #[test]
    fn test_update_missing_record_is_noop() {
        let mut collection = vec![record(json!({"id": "a"}))];
        apply(
            &mut collection,
            &MutationPayload::Update {
                id: "zzz".to_string(),
                patch: record(json!({"amount": 7})),
            },
        );
        assert_eq!(collection, vec![record(json!({"id": "a"}))]);
    }

    #[test]
    fn test_delete_removes_by_id() {
        let mut collection = vec![record(json!({"id": "a"})), record(json!({"id": "b"}))];
        apply(&mut collection, &MutationPayload::Delete { id: "a".to_string() });

        assert_eq!(collection, vec![record(json!({"id": "b"}))]);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut collection = vec![record(json!({"id": "a", "v": 1})), record(json!({"id": "b"}))];
        upsert(&mut collection, record(json!({"id": "a", "v": 2})));

        assert_eq!(collection[0].get("v"), Some(&json!(2)));
        assert_eq!(collection.len(), 2);
    }
}
