//! Error types for the sync daemon
//!
//! Provides the error taxonomy of the cache, queue, remote service and sync
//! engine using thiserror, plus the HTTP mapping used by the API layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ErrorResponse;

// == Cache Error ==
/// Failures raised by the local cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Value could not be serialized for storage
    #[error("Failed to serialize value for key '{key}'")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Persistence backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

// == Remote Error ==
/// Any failure reported by the remote data service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Request reached the service and was refused (validation, permission, conflict)
    #[error("Remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Request never completed
    #[error("Network error: {0}")]
    Network(String),

    /// Response could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Target record does not exist
    #[error("Record '{id}' not found in '{table}'")]
    NotFound { table: String, id: String },
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

// == Validation Error ==
/// Payload shape failures detected before a mutation is queued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Table name cannot be empty")]
    EmptyTable,

    #[error("Table name '{0}' is reserved for internal cache keys")]
    ReservedTable(String),

    #[error("Missing required field '{field}' for table '{table}'")]
    MissingField { table: String, field: String },

    #[error("Field '{field}' of table '{table}' must be {expected}")]
    InvalidField {
        table: String,
        field: String,
        expected: String,
    },

    #[error("Record id must be a non-empty string")]
    InvalidId,

    #[error("Operation '{0}' requires a record id")]
    MissingId(String),

    #[error("Payload must be a JSON object")]
    NotAnObject,
}

// == Queue Error ==
/// Failures of the offline mutation queue.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Pending mutation not found: {0}")]
    MutationNotFound(Uuid),
}

// == Sync Error ==
/// Failure of a sync cycle. The cycle is aborted, committed watermarks stay.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cannot sync while offline")]
    Offline,

    #[error("Pull failed for table '{table}'")]
    Pull {
        table: String,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<QueueError> for SyncError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Cache(e) => SyncError::Cache(e),
            other => SyncError::Cache(CacheError::Storage(other.to_string())),
        }
    }
}

// == API Error ==
/// Unified error type for HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Cache(CacheError::Serialization { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Cache(CacheError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Queue(QueueError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Queue(QueueError::MutationNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Queue(QueueError::Cache(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Sync(SyncError::Offline) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Sync(SyncError::Pull { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Sync(SyncError::Cache(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            ApiError::Sync(SyncError::Pull { table, source }) => {
                format!("Pull failed for table '{}': {}", table, source)
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for HTTP handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError::NotFound("k".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_maps_to_422() {
        let err = ApiError::from(QueueError::from(ValidationError::EmptyTable));
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_offline_maps_to_503() {
        let response = ApiError::from(SyncError::Offline).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_pull_error_keeps_source_message() {
        let err = SyncError::Pull {
            table: "incidents".to_string(),
            source: RemoteError::Network("connection reset".to_string()),
        };
        assert!(err.to_string().contains("incidents"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Network error: connection reset"));
    }
}
