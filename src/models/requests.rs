//! Request DTOs for the daemon API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;
use serde_json::Value;

use crate::queue::Operation;

/// Request body for storing a cache value (PUT /cache/:key)
///
/// # Fields
/// - `value`: Any JSON value
/// - `ttl_ms`: Optional TTL in milliseconds (uses default if not specified)
/// - `persistent`: Store without expiry; overrides `ttl_ms`
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub value: Value,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub persistent: bool,
}

/// Query string for reading a cache value (GET /cache/:key)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

/// Request body for queueing a mutation (POST /queue)
///
/// For `update` and `delete` the target record is the payload's `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub table: String,
    pub operation: Operation,
    #[serde(default)]
    pub payload: Value,
}

impl EnqueueRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.table.trim().is_empty() {
            return Some("Table cannot be empty".to_string());
        }
        if self.payload.is_null() {
            return Some("Payload is required".to_string());
        }
        None
    }
}

/// Request body for the host connectivity signal (PUT /connectivity)
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}
