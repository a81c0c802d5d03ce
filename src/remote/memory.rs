//! In-process remote backend
//!
//! Keeps tables in memory, records every call, and can be told to fail or
//! slow down, which makes it the test double for the sync engine. The daemon
//! also runs on it when no remote URL is configured.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::clock::{SharedClock, SystemClock};
use crate::error::RemoteError;
use crate::models::{Record, UPDATED_AT_FIELD};
use crate::remote::{RemoteDataService, SelectFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Insert,
    Update,
    Delete,
    Select,
}

/// One call received by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Insert { table: String, record: Record },
    Update { table: String, id: String, patch: Record },
    Delete { table: String, id: String },
    Select { table: String, filter: SelectFilter },
}

impl RemoteCall {
    pub fn kind(&self) -> CallKind {
        match self {
            RemoteCall::Insert { .. } => CallKind::Insert,
            RemoteCall::Update { .. } => CallKind::Update,
            RemoteCall::Delete { .. } => CallKind::Delete,
            RemoteCall::Select { .. } => CallKind::Select,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            RemoteCall::Insert { table, .. }
            | RemoteCall::Update { table, .. }
            | RemoteCall::Delete { table, .. }
            | RemoteCall::Select { table, .. } => table,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Vec<Record>>,
    calls: Vec<RemoteCall>,
    failures: HashMap<(String, CallKind), RemoteError>,
    latency: Option<Duration>,
    reachable: bool,
}

// == In-Memory Remote ==
#[derive(Debug, Clone)]
pub struct InMemoryRemote {
    state: Arc<Mutex<State>>,
    clock: SharedClock,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryRemote {
    /// Creates an empty backend stamping `updated_at` from `clock`.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                reachable: true,
                ..State::default()
            })),
            clock,
        }
    }

    fn timestamp(&self) -> String {
        format_timestamp(self.clock.now())
    }

    /// Stores a record directly, as if another client had written it.
    pub async fn seed(&self, table: &str, mut record: Record) -> Record {
        if record.id().is_none() {
            record.set_id(Uuid::new_v4().to_string());
        }
        if record.get(UPDATED_AT_FIELD).is_none() {
            record.insert(UPDATED_AT_FIELD, Value::String(self.timestamp()));
        }
        let mut state = self.state.lock().await;
        let rows = state.tables.entry(table.to_string()).or_default();
        rows.retain(|r| r.id() != record.id());
        rows.push(record.clone());
        record
    }

    /// Current rows of `table`.
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        let state = self.state.lock().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    /// Calls of one kind received so far.
    pub async fn calls_of(&self, kind: CallKind) -> Vec<RemoteCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| c.kind() == kind)
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Makes every `kind` call on `table` fail with `error` until healed.
    pub async fn fail(&self, table: &str, kind: CallKind, error: RemoteError) {
        let mut state = self.state.lock().await;
        state.failures.insert((table.to_string(), kind), error);
    }

    pub async fn heal(&self) {
        self.state.lock().await.failures.clear();
    }

    /// Delays every call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Controls the answer to `ping`.
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.reachable = reachable;
    }

    /// Records the call, applies latency and returns the injected failure.
    async fn enter(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let (latency, failure) = {
            let mut state = self.state.lock().await;
            let failure = state
                .failures
                .get(&(call.table().to_string(), call.kind()))
                .cloned();
            state.calls.push(call);
            (state.latency, failure)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteDataService for InMemoryRemote {
    async fn insert(&self, table: &str, mut record: Record) -> Result<Record, RemoteError> {
        self.enter(RemoteCall::Insert {
            table: table.to_string(),
            record: record.clone(),
        })
        .await?;

        let now = self.timestamp();
        if record.id().is_none() {
            record.set_id(Uuid::new_v4().to_string());
        }
        if record.get("created_at").is_none() {
            record.insert("created_at", Value::String(now.clone()));
        }
        record.insert(UPDATED_AT_FIELD, Value::String(now));

        let mut state = self.state.lock().await;
        let rows = state.tables.entry(table.to_string()).or_default();
        if rows.iter().any(|r| r.id() == record.id()) {
            return Err(RemoteError::Rejected {
                status: 409,
                message: format!("duplicate key {:?}", record.id()),
            });
        }
        rows.push(record.clone());
        Ok(record)
    }

    async fn update(&self, table: &str, id: &str, patch: Record) -> Result<Record, RemoteError> {
        self.enter(RemoteCall::Update {
            table: table.to_string(),
            id: id.to_string(),
            patch: patch.clone(),
        })
        .await?;

        let now = self.timestamp();
        let mut state = self.state.lock().await;
        let row = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id() == Some(id)))
            .ok_or_else(|| RemoteError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;

        row.merge_from(&patch);
        row.set_id(id);
        row.insert(UPDATED_AT_FIELD, Value::String(now));
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        self.enter(RemoteCall::Delete {
            table: table.to_string(),
            id: id.to_string(),
        })
        .await?;

        let mut state = self.state.lock().await;
        let rows = state.tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|r| r.id() != Some(id));
        if rows.len() == before {
            return Err(RemoteError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn select(&self, table: &str, filter: &SelectFilter) -> Result<Vec<Record>, RemoteError> {
        self.enter(RemoteCall::Select {
            table: table.to_string(),
            filter: filter.clone(),
        })
        .await?;

        let state = self.state.lock().await;
        let rows = state.tables.get(table).cloned().unwrap_or_default();
        Ok(match filter.updated_after {
            Some(since) => rows
                .into_iter()
                .filter(|r| r.updated_at().is_some_and(|t| t > since))
                .collect(),
            None => rows,
        })
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        if self.state.lock().await.reachable {
            Ok(())
        } else {
            Err(RemoteError::Network("unreachable".to_string()))
        }
    }
}

/// Timestamp format used for `updated_at` values.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
