//! Table schemas
//!
//! Shape checks applied to mutation payloads before they are queued. Tables
//! without a registered schema only get the structural checks done by the
//! queue itself.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use crate::error::ValidationError;
use crate::models::Record;

// == Field Kinds ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    /// RFC 3339 timestamp or `YYYY-MM-DD` date
    Timestamp,
    /// String restricted to the listed values
    OneOf(&'static [&'static str]),
}

impl FieldKind {
    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::Timestamp, Value::String(s)) => {
                DateTime::parse_from_rfc3339(s).is_ok()
                    || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }
            (FieldKind::OneOf(allowed), Value::String(s)) => allowed.contains(&s.as_str()),
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            FieldKind::String => "a string".to_string(),
            FieldKind::Number => "a number".to_string(),
            FieldKind::Timestamp => "an RFC 3339 timestamp or YYYY-MM-DD date".to_string(),
            FieldKind::OneOf(allowed) => format!("one of {}", allowed.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

// == Table Schema ==
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
}

const INCIDENT_TYPES: &[&str] = &["verbal", "physical", "financial", "other"];
const SENSITIVITY_LEVELS: &[&str] = &["high", "medium", "low"];
const ASSET_STATUSES: &[&str] = &["active", "pending", "divided"];

// Built-in tables only check the kind of the fields a record carries.
const INCIDENT_FIELDS: &[FieldSpec] = &[
    optional("type", FieldKind::OneOf(INCIDENT_TYPES)),
    optional("description", FieldKind::String),
    optional("occurred_at", FieldKind::Timestamp),
    optional("location", FieldKind::String),
    optional("sensitivity_level", FieldKind::OneOf(SENSITIVITY_LEVELS)),
    optional("sentiment_score", FieldKind::Number),
];

const EXPENSE_FIELDS: &[FieldSpec] = &[
    optional("amount", FieldKind::Number),
    optional("category", FieldKind::String),
    optional("date", FieldKind::Timestamp),
    optional("description", FieldKind::String),
    optional("receipt_url", FieldKind::String),
];

const ASSET_FIELDS: &[FieldSpec] = &[
    optional("name", FieldKind::String),
    optional("status", FieldKind::OneOf(ASSET_STATUSES)),
    optional("value", FieldKind::Number),
];

impl TableSchema {
    /// Checks a full record destined for insertion.
    pub fn validate_create(&self, record: &Record) -> Result<(), ValidationError> {
        for field in self.fields {
            match record.get(field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(ValidationError::MissingField {
                        table: self.table.to_string(),
                        field: field.name.to_string(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) => self.check(field, value)?,
            }
        }
        Ok(())
    }

    /// Checks the fields present in a partial update.
    pub fn validate_patch(&self, patch: &Record) -> Result<(), ValidationError> {
        for field in self.fields {
            match patch.get(field.name) {
                Some(Value::Null) if field.required => {
                    return Err(ValidationError::MissingField {
                        table: self.table.to_string(),
                        field: field.name.to_string(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) => self.check(field, value)?,
            }
        }
        Ok(())
    }

    fn check(&self, field: &FieldSpec, value: &Value) -> Result<(), ValidationError> {
        if field.kind.accepts(value) {
            Ok(())
        } else {
            Err(ValidationError::InvalidField {
                table: self.table.to_string(),
                field: field.name.to_string(),
                expected: field.kind.describe(),
            })
        }
    }
}

// == Registry ==
/// Lookup of table schemas by table name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, TableSchema>,
}

impl SchemaRegistry {
    /// Registry without any schema; every table is accepted structurally.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Schemas for the incident, expense and asset tables.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(TableSchema {
            table: "incidents",
            fields: INCIDENT_FIELDS,
        });
        registry.register(TableSchema {
            table: "expenses",
            fields: EXPENSE_FIELDS,
        });
        registry.register(TableSchema {
            table: "assets",
            fields: ASSET_FIELDS,
        });
        registry
    }

    pub fn register(&mut self, schema: TableSchema) {
        self.schemas.insert(schema.table, schema);
    }

    pub fn get(&self, table: &str) -> Option<&TableSchema> {
        self.schemas.get(table)
    }
}
