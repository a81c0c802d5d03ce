//! Offline Mutation Queue
//!
//! Durable, ordered log of pending writes kept in the cache under a
//! well-known key. Enqueueing patches the cached collection optimistically;
//! draining replays the log against the remote service in per-table FIFO
//! order.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheStore, GetOptions, SetOptions, SharedCache};
use crate::collection;
use crate::error::{CacheError, QueueError, RemoteError, ValidationError};
use crate::models::{placeholder_id, Record, SchemaRegistry, ID_FIELD};
use crate::queue::{patch, MutationPayload, Operation, PendingMutation};
use crate::remote::RemoteDataService;
use crate::sync::watermark;

/// Cache key holding the pending mutation log
pub const QUEUE_KEY: &str = "offline_changes";

// == Drain Report ==
/// A mutation that could not be replayed in this drain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedMutation {
    pub mutation_id: Uuid,
    pub table: String,
    pub operation: Operation,
    pub error: String,
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainReport {
    /// Mutations acknowledged by the remote and removed from the log
    pub acknowledged: Vec<Uuid>,
    /// Mutations that failed; each blocks its table for the rest of the pass
    pub failed: Vec<FailedMutation>,
    /// Mutations not attempted because an earlier one of their table failed
    pub skipped: usize,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Tables that still have a stuck mutation.
    pub fn blocked_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.failed.iter().map(|f| f.table.clone()).collect();
        tables.dedup();
        tables
    }
}

/// What a successful replay returned.
enum Ack {
    Stored(Record),
    Deleted,
}

// == Mutation Queue ==
#[derive(Debug, Clone)]
pub struct MutationQueue {
    cache: SharedCache,
    schemas: SchemaRegistry,
}

impl MutationQueue {
    pub fn new(cache: SharedCache, schemas: SchemaRegistry) -> Self {
        Self { cache, schemas }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    // == Enqueue ==
    /// Records a write from an untyped body and applies it optimistically.
    ///
    /// For `update` and `delete`, the target id is the body's `id` field.
    pub async fn enqueue(
        &self,
        table: &str,
        operation: Operation,
        payload: Value,
    ) -> Result<PendingMutation, QueueError> {
        let payload = MutationPayload::from_json(operation, payload)?;
        self.enqueue_mutation(table, payload).await
    }

    /// Records a typed write and applies it optimistically.
    pub async fn enqueue_mutation(
        &self,
        table: &str,
        mut payload: MutationPayload,
    ) -> Result<PendingMutation, QueueError> {
        self.validate(table, &payload)?;

        if let MutationPayload::Create { record } = &mut payload {
            if record.id().is_none() {
                record.set_id(placeholder_id());
            }
        }

        let mut cache = self.cache.write().await;
        let mutation = PendingMutation::new(table, payload, cache.clock().now());

        let mut log = load_log(&mut cache)?;
        log.push(mutation.clone());
        save_log(&mut cache, &log)?;

        let mut records = collection::load_or_empty(&mut cache, table)?;
        patch::apply(&mut records, &mutation.payload);
        collection::store(&mut cache, table, &records)?;

        debug!(
            "Queued {} on '{}' ({} pending)",
            mutation.operation(),
            table,
            log.len()
        );
        Ok(mutation)
    }

    fn validate(&self, table: &str, payload: &MutationPayload) -> Result<(), ValidationError> {
        if table.trim().is_empty() {
            return Err(ValidationError::EmptyTable);
        }
        if collection::is_reserved_table(table) {
            return Err(ValidationError::ReservedTable(table.to_string()));
        }

        let Some(schema) = self.schemas.get(table) else {
            return Ok(());
        };

        match payload {
            MutationPayload::Create { record } => schema.validate_create(record),
            MutationPayload::Update { patch, .. } => schema.validate_patch(patch),
            MutationPayload::Delete { .. } => Ok(()),
        }
    }

    // == Inspection ==
    /// All pending mutations in enqueue order.
    pub async fn pending(&self) -> Result<Vec<PendingMutation>, QueueError> {
        let mut cache = self.cache.write().await;
        Ok(load_log(&mut cache)?)
    }

    /// Pending mutations of one table in enqueue order.
    pub async fn pending_for(&self, table: &str) -> Result<Vec<PendingMutation>, QueueError> {
        Ok(self
            .pending()
            .await?
            .into_iter()
            .filter(|m| m.table == table)
            .collect())
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.pending().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    // == Abandon ==
    /// Drops one pending mutation without replaying it.
    ///
    /// The optimistic change cannot be undone locally, so the table's cached
    /// collection and watermark are reset and the next pull rebuilds them.
    pub async fn abandon(&self, mutation_id: Uuid) -> Result<PendingMutation, QueueError> {
        let mut cache = self.cache.write().await;
        let mut log = load_log(&mut cache)?;

        let index = log
            .iter()
            .position(|m| m.mutation_id == mutation_id)
            .ok_or(QueueError::MutationNotFound(mutation_id))?;
        let abandoned = log.remove(index);
        save_log(&mut cache, &log)?;

        collection::invalidate(&mut cache, &abandoned.table)?;
        watermark::reset(&mut cache, &abandoned.table)?;

        warn!(
            "Abandoned {} on '{}' ({})",
            abandoned.operation(),
            abandoned.table,
            mutation_id
        );
        Ok(abandoned)
    }

    /// Drops every pending mutation and resets the affected tables.
    ///
    /// Returns the number of mutations dropped.
    pub async fn clear(&self) -> Result<usize, QueueError> {
        let mut cache = self.cache.write().await;
        let log = load_log(&mut cache)?;

        let tables: HashSet<&str> = log.iter().map(|m| m.table.as_str()).collect();
        for table in tables {
            collection::invalidate(&mut cache, table)?;
            watermark::reset(&mut cache, table)?;
        }
        cache.remove(QUEUE_KEY)?;

        if !log.is_empty() {
            warn!("Cleared {} pending mutations", log.len());
        }
        Ok(log.len())
    }

    // == Drain ==
    /// Replays pending mutations against `remote`.
    ///
    /// Mutations are sent in enqueue order. Each acknowledged mutation is
    /// removed from the log immediately. The first failure of a table blocks
    /// that table for the rest of the pass (the failed mutation and everything
    /// after it stay queued), while other tables keep draining. Mutations
    /// enqueued during the drain are left for the next pass, and mutations
    /// abandoned or cleared during the drain are never sent.
    pub async fn drain(&self, remote: &dyn RemoteDataService) -> Result<DrainReport, QueueError> {
        let snapshot = self.pending().await?;
        let mut report = DrainReport::default();
        if snapshot.is_empty() {
            return Ok(report);
        }

        info!("Draining {} pending mutations", snapshot.len());
        let mut blocked: HashSet<String> = HashSet::new();
        // placeholder id -> server id, per table
        let mut assigned: HashMap<String, HashMap<String, String>> = HashMap::new();

        for mutation in snapshot {
            if blocked.contains(&mutation.table) {
                report.skipped += 1;
                continue;
            }

            let Some(mut mutation) = self.still_pending(mutation.mutation_id).await? else {
                debug!(
                    "Mutation {} on '{}' left the queue during drain",
                    mutation.mutation_id, mutation.table
                );
                continue;
            };

            if let Some(ids) = assigned.get(&mutation.table) {
                mutation.payload.rewrite_ids(ids);
            }

            match replay(remote, &mutation).await {
                Ok(ack) => {
                    let server_id = self.acknowledge(&mutation, ack).await?;
                    if let (Some(local), Some(server)) = (mutation.record_id(), server_id) {
                        if local != server {
                            assigned
                                .entry(mutation.table.clone())
                                .or_default()
                                .insert(local.to_string(), server);
                        }
                    }
                    report.acknowledged.push(mutation.mutation_id);
                }
                Err(err) => {
                    warn!(
                        "Failed to replay {} on '{}' ({}): {}",
                        mutation.operation(),
                        mutation.table,
                        mutation.mutation_id,
                        err
                    );
                    self.record_failure(mutation.mutation_id, &err).await?;
                    blocked.insert(mutation.table.clone());
                    report.failed.push(FailedMutation {
                        mutation_id: mutation.mutation_id,
                        table: mutation.table.clone(),
                        operation: mutation.operation(),
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            "Drain finished: {} acknowledged, {} failed, {} skipped",
            report.acknowledged.len(),
            report.failed.len(),
            report.skipped
        );
        Ok(report)
    }

    /// Current log entry for `mutation_id`, if it is still queued.
    async fn still_pending(&self, mutation_id: Uuid) -> Result<Option<PendingMutation>, CacheError> {
        let mut cache = self.cache.write().await;
        Ok(load_log(&mut cache)?
            .into_iter()
            .find(|m| m.mutation_id == mutation_id))
    }

    /// Removes an acknowledged mutation and folds the server's answer into
    /// the cache. Returns the server-side id of a created record.
    async fn acknowledge(
        &self,
        mutation: &PendingMutation,
        ack: Ack,
    ) -> Result<Option<String>, CacheError> {
        let mut cache = self.cache.write().await;
        let mut log = load_log(&mut cache)?;
        log.retain(|m| m.mutation_id != mutation.mutation_id);

        let table = mutation.table.as_str();
        let mut server_id = None;

        if let (MutationPayload::Create { record }, Ack::Stored(stored)) = (&mutation.payload, &ack) {
            if let (Some(local), Some(server)) = (record.id(), stored.id()) {
                if local != server {
                    let ids = HashMap::from([(local.to_string(), server.to_string())]);
                    for pending in log.iter_mut().filter(|m| m.table == table) {
                        pending.payload.rewrite_ids(&ids);
                    }
                }
                server_id = Some(server.to_string());
            }
        }
        save_log(&mut cache, &log)?;

        if let Ack::Stored(stored) = ack {
            if let Some(mut records) = collection::load(&mut cache, table)? {
                if let Some(local) = mutation.record_id() {
                    records.retain(|r| r.id() != Some(local));
                }
                patch::upsert(&mut records, stored);
                patch::rebase(&mut records, log.iter().filter(|m| m.table == table));
                collection::store(&mut cache, table, &records)?;
            }
        }

        Ok(server_id)
    }

    async fn record_failure(&self, mutation_id: Uuid, err: &RemoteError) -> Result<(), CacheError> {
        let mut cache = self.cache.write().await;
        let mut log = load_log(&mut cache)?;
        if let Some(entry) = log.iter_mut().find(|m| m.mutation_id == mutation_id) {
            entry.attempts += 1;
            entry.last_error = Some(err.to_string());
            save_log(&mut cache, &log)?;
        }
        Ok(())
    }
}

/// Sends one mutation to the remote service.
async fn replay(remote: &dyn RemoteDataService, mutation: &PendingMutation) -> Result<Ack, RemoteError> {
    let table = mutation.table.as_str();
    match &mutation.payload {
        MutationPayload::Create { record } => {
            let mut body = record.clone();
            if body.has_placeholder_id() {
                body.0.remove(ID_FIELD);
            }
            remote.insert(table, body).await.map(Ack::Stored)
        }
        MutationPayload::Update { id, patch } => {
            remote.update(table, id, patch.clone()).await.map(Ack::Stored)
        }
        MutationPayload::Delete { id } => match remote.delete(table, id).await {
            Ok(()) => Ok(Ack::Deleted),
            // Already gone on the server: the tombstone has nothing left to do
            Err(RemoteError::NotFound { .. }) => Ok(Ack::Deleted),
            Err(err) => Err(err),
        },
    }
}

/// Reads the pending mutation log. A missing log is empty.
pub(crate) fn load_log(cache: &mut CacheStore) -> Result<Vec<PendingMutation>, CacheError> {
    Ok(cache
        .get::<Vec<PendingMutation>>(QUEUE_KEY, GetOptions::default())?
        .unwrap_or_default())
}

fn save_log(cache: &mut CacheStore, log: &[PendingMutation]) -> Result<(), CacheError> {
    if log.is_empty() {
        cache.remove(QUEUE_KEY)
    } else {
        cache.set(QUEUE_KEY, log, SetOptions::persistent())
    }
}
