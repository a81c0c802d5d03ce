//! Remote Data Service Module
//!
//! The hosted backend the sync engine replays mutations against and pulls
//! changes from.
//!
//! # Implementations
//! - [`PostgrestRemote`] - PostgREST-style REST API over reqwest
//! - [`InMemoryRemote`] - in-process backend for tests and local development

mod memory;
mod postgrest;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RemoteError;
use crate::models::Record;

pub use memory::{CallKind, InMemoryRemote, RemoteCall};
pub use postgrest::PostgrestRemote;

/// Filter for [`RemoteDataService::select`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectFilter {
    /// Only return records with `updated_at` strictly greater than this
    pub updated_after: Option<DateTime<Utc>>,
}

impl SelectFilter {
    pub fn updated_after(since: DateTime<Utc>) -> Self {
        Self {
            updated_after: Some(since),
        }
    }
}

// == Remote Data Service ==
/// Per-table create/read/update/delete against the backend.
#[async_trait]
pub trait RemoteDataService: Send + Sync {
    /// Inserts a record and returns it as stored (with server id and timestamps).
    async fn insert(&self, table: &str, record: Record) -> Result<Record, RemoteError>;

    /// Applies a partial update and returns the updated record.
    async fn update(&self, table: &str, id: &str, patch: Record) -> Result<Record, RemoteError>;

    /// Deletes a record.
    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError>;

    /// Lists records matching `filter`.
    async fn select(&self, table: &str, filter: &SelectFilter) -> Result<Vec<Record>, RemoteError>;

    /// Cheap reachability check used by the connectivity probe.
    async fn ping(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Shared handle to a remote service.
pub type SharedRemote = Arc<dyn RemoteDataService>;
