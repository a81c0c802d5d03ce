//! Pending mutation model
//!
//! A write recorded locally and not yet acknowledged by the remote service.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::{Record, ID_FIELD};

// == Operation ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

// == Payload ==
/// Mutation body, tagged by operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum MutationPayload {
    /// Full record to insert. Its id may be a local placeholder.
    Create { record: Record },
    /// Shallow patch for the record `id`
    Update { id: String, patch: Record },
    /// Tombstone for the record `id`
    Delete { id: String },
}

impl MutationPayload {
    /// Builds a payload from an untyped JSON body.
    ///
    /// For `update` and `delete` the record id is taken from the body's `id`
    /// field; the id is not part of the update patch.
    pub fn from_json(operation: Operation, payload: Value) -> Result<Self, ValidationError> {
        match operation {
            Operation::Create => {
                let record = Record::from_value(payload).ok_or(ValidationError::NotAnObject)?;
                if record.get(ID_FIELD).is_some_and(|v| !v.is_null()) {
                    require_id(record.get(ID_FIELD))?;
                }
                Ok(MutationPayload::Create { record })
            }
            Operation::Update => {
                let mut patch = Record::from_value(payload).ok_or(ValidationError::NotAnObject)?;
                let id = require_id(patch.0.remove(ID_FIELD).as_ref())
                    .map_err(|_| ValidationError::MissingId(operation.to_string()))?;
                Ok(MutationPayload::Update { id, patch })
            }
            Operation::Delete => {
                let id = match &payload {
                    Value::String(_) => require_id(Some(&payload)),
                    Value::Object(map) => require_id(map.get(ID_FIELD)),
                    _ => Err(ValidationError::NotAnObject),
                }
                .map_err(|_| ValidationError::MissingId(operation.to_string()))?;
                Ok(MutationPayload::Delete { id })
            }
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            MutationPayload::Create { .. } => Operation::Create,
            MutationPayload::Update { .. } => Operation::Update,
            MutationPayload::Delete { .. } => Operation::Delete,
        }
    }

    /// Identifier of the targeted record, if known yet.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            MutationPayload::Create { record } => record.id(),
            MutationPayload::Update { id, .. } | MutationPayload::Delete { id } => Some(id),
        }
    }

    /// Replaces references to ids found in `ids` (placeholder -> server id).
    /// Returns true if anything changed.
    pub fn rewrite_ids(&mut self, ids: &HashMap<String, String>) -> bool {
        match self {
            MutationPayload::Create { record } => match record.id().and_then(|id| ids.get(id)) {
                Some(server_id) => {
                    let server_id = server_id.clone();
                    record.set_id(server_id);
                    true
                }
                None => false,
            },
            MutationPayload::Update { id, .. } | MutationPayload::Delete { id } => {
                match ids.get(id.as_str()) {
                    Some(server_id) => {
                        *id = server_id.clone();
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

fn require_id(value: Option<&Value>) -> Result<String, ValidationError> {
    match value {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.clone()),
        _ => Err(ValidationError::InvalidId),
    }
}

// == Pending Mutation ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    /// Unique handle used to acknowledge or abandon this entry
    pub mutation_id: Uuid,
    /// Target remote table
    pub table: String,
    #[serde(flatten)]
    pub payload: MutationPayload,
    pub enqueued_at: DateTime<Utc>,
    /// Failed replay attempts so far
    #[serde(default)]
    pub attempts: u32,
    /// Error from the last failed attempt
    #[serde(default)]
    pub last_error: Option<String>,
}

impl PendingMutation {
    pub fn new(table: impl Into<String>, payload: MutationPayload, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            mutation_id: Uuid::new_v4(),
            table: table.into(),
            payload,
            enqueued_at,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn operation(&self) -> Operation {
        self.payload.operation()
    }

    pub fn record_id(&self) -> Option<&str> {
        self.payload.record_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_payload_extracts_id() {
        let payload =
            MutationPayload::from_json(Operation::Update, json!({"id": "r1", "amount": 3})).unwrap();

        match payload {
            MutationPayload::Update { id, patch } => {
                assert_eq!(id, "r1");
                assert!(patch.get("id").is_none());
                assert_eq!(patch.get("amount"), Some(&json!(3)));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_update_without_id_is_rejected() {
        let result = MutationPayload::from_json(Operation::Update, json!({"amount": 3}));
        assert_eq!(result, Err(ValidationError::MissingId("update".to_string())));
    }

    #[test]
    fn test_delete_accepts_bare_id() {
        let payload = MutationPayload::from_json(Operation::Delete, json!("r9")).unwrap();
        assert_eq!(payload, MutationPayload::Delete { id: "r9".to_string() });
    }

    #[test]
    fn test_create_rejects_non_object() {
        let result = MutationPayload::from_json(Operation::Create, json!([1, 2]));
        assert_eq!(result, Err(ValidationError::NotAnObject));
    }

    #[test]
    fn test_create_rejects_non_string_id() {
        let result = MutationPayload::from_json(Operation::Create, json!({"id": 12}));
        assert_eq!(result, Err(ValidationError::InvalidId));
    }

    #[test]
    fn test_pending_mutation_serialized_shape() {
        let mutation = PendingMutation::new(
            "expenses",
            MutationPayload::Delete { id: "e1".to_string() },
            Utc::now(),
        );
        let raw = serde_json::to_value(&mutation).unwrap();

        assert_eq!(raw["operation"], json!("delete"));
        assert_eq!(raw["id"], json!("e1"));
        assert_eq!(raw["table"], json!("expenses"));

        let back: PendingMutation = serde_json::from_value(raw).unwrap();
        assert_eq!(back, mutation);
    }

    #[test]
    fn test_rewrite_ids() {
        let mut ids = HashMap::new();
        ids.insert("local-1".to_string(), "srv-1".to_string());

        let mut update = MutationPayload::Update {
            id: "local-1".to_string(),
            patch: Record::new(),
        };
        assert!(update.rewrite_ids(&ids));
        assert_eq!(update.record_id(), Some("srv-1"));

        let mut delete = MutationPayload::Delete { id: "other".to_string() };
        assert!(!delete.rewrite_ids(&ids));
    }
}
