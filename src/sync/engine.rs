//! Reconciliation Sync Engine
//!
//! One cycle drains the mutation queue, then pulls every managed table
//! incrementally from its watermark and merges the result into the cache.
//! At most one cycle runs at a time; triggers arriving meanwhile are
//! coalesced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::SharedCache;
use crate::collection;
use crate::connectivity::SharedConnectivity;
use crate::error::SyncError;
use crate::queue::{load_log, patch, DrainReport, MutationQueue};
use crate::remote::{SelectFilter, SharedRemote};
use crate::sync::merge::merge_records;
use crate::sync::{watermark, SyncStatus, SyncWatermark};

// == Options ==
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Managed tables, pulled in this order
    pub tables: Vec<String>,
    /// Look-back applied to the watermark when pulling
    pub watermark_overlap: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            tables: vec![
                "incidents".to_string(),
                "expenses".to_string(),
                "assets".to_string(),
            ],
            watermark_overlap: Duration::from_secs(1),
        }
    }
}

// == Reports ==
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePull {
    pub table: String,
    /// Records returned by the remote
    pub fetched: usize,
    /// Watermark committed for the table
    pub watermark: DateTime<Utc>,
    /// True when the pull restarted from the beginning
    pub full: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub drain: DrainReport,
    pub pulls: Vec<TablePull>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SyncOutcome {
    /// This call ran a full cycle
    Completed(SyncReport),
    /// Another cycle was already in flight; nothing was done
    Coalesced,
}

/// Releases the in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    cache: SharedCache,
    queue: MutationQueue,
    remote: SharedRemote,
    connectivity: SharedConnectivity,
    options: SyncOptions,
    in_flight: AtomicBool,
    status: watch::Sender<SyncStatus>,
}

// == Sync Engine ==
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("tables", &self.inner.options.tables)
            .field("status", &*self.inner.status.borrow())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(
        cache: SharedCache,
        queue: MutationQueue,
        remote: SharedRemote,
        connectivity: SharedConnectivity,
        options: SyncOptions,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus {
            is_online: connectivity.is_online(),
            ..SyncStatus::default()
        });

        Self {
            inner: Arc::new(Inner {
                cache,
                queue,
                remote,
                connectivity,
                options,
                in_flight: AtomicBool::new(false),
                status,
            }),
        }
    }

    pub fn tables(&self) -> &[String] {
        &self.inner.options.tables
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.inner.queue
    }

    // == Status ==
    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        let mut status = self.inner.status.borrow().clone();
        status.is_online = self.inner.connectivity.is_online();
        status
    }

    /// Receiver updated at cycle start, cycle end and connectivity changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Publishes a connectivity transition to status subscribers.
    pub fn note_connectivity(&self, online: bool) {
        self.inner.status.send_if_modified(|status| {
            let changed = status.is_online != online;
            status.is_online = online;
            changed
        });
    }

    /// Current watermarks of the managed tables.
    pub async fn watermarks(&self) -> Result<Vec<SyncWatermark>, SyncError> {
        let mut cache = self.inner.cache.write().await;
        Ok(watermark::snapshot(&mut cache, &self.inner.options.tables)?)
    }

    // == Force Sync ==
    /// Runs one sync cycle now.
    ///
    /// Returns [`SyncOutcome::Coalesced`] without doing anything when a cycle
    /// is already in flight.
    pub async fn force_sync(&self) -> Result<SyncOutcome, SyncError> {
        if !self.inner.connectivity.is_online() {
            return Err(SyncError::Offline);
        }

        let Some(_guard) = InFlight::acquire(&self.inner.in_flight) else {
            debug!("Sync already in flight, coalescing trigger");
            return Ok(SyncOutcome::Coalesced);
        };

        self.inner.status.send_modify(|status| status.is_syncing = true);
        let result = self.run_cycle().await;
        let pending = match self.inner.queue.len().await {
            Ok(count) => Some(count),
            Err(err) => {
                warn!("Failed to count pending mutations: {}", err);
                None
            }
        };

        self.inner.status.send_modify(|status| {
            status.is_syncing = false;
            if let Some(count) = pending {
                status.pending_mutations = count;
            }
            match &result {
                Ok(report) => {
                    status.last_sync_time = Some(report.finished_at);
                    status.blocked_tables = report.drain.blocked_tables();
                    status.last_error = if report.drain.is_clean() {
                        None
                    } else {
                        Some(format!(
                            "{} pending mutation(s) failed to sync",
                            report.drain.failed.len()
                        ))
                    };
                }
                Err(err) => status.last_error = Some(err.to_string()),
            }
        });

        match result {
            Ok(report) => {
                info!(
                    "Sync cycle complete: {} mutations acknowledged, {} tables pulled",
                    report.drain.acknowledged.len(),
                    report.pulls.len()
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(err) => {
                error!("Sync cycle failed: {}", err);
                Err(err)
            }
        }
    }

    async fn run_cycle(&self) -> Result<SyncReport, SyncError> {
        // Local writes go out before anything is pulled
        let drain = self.inner.queue.drain(self.inner.remote.as_ref()).await?;
        if !drain.is_clean() {
            warn!(
                "{} mutations could not be replayed; blocked tables: {:?}",
                drain.failed.len(),
                drain.blocked_tables()
            );
        }

        let mut pulls = Vec::with_capacity(self.inner.options.tables.len());
        for table in &self.inner.options.tables {
            pulls.push(self.pull_table(table).await?);
        }

        let finished_at = self.inner.cache.read().await.clock().now();
        Ok(SyncReport {
            drain,
            pulls,
            finished_at,
        })
    }

    /// Pulls one table and commits its watermark. Nothing is committed if the
    /// fetch fails.
    async fn pull_table(&self, table: &str) -> Result<TablePull, SyncError> {
        let (since, full, fetch_start) = {
            let mut cache = self.inner.cache.write().await;
            let mark = watermark::load(&mut cache, table)?;
            let have_collection = collection::load(&mut cache, table)?.is_some();
            let fetch_start = cache.clock().now();

            match mark {
                // An expired collection cannot be rebuilt incrementally
                Some(_) if !have_collection => (None, true, fetch_start),
                Some(mark) => {
                    let overlap = chrono::Duration::from_std(self.inner.options.watermark_overlap)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                    (Some(mark - overlap), false, fetch_start)
                }
                None => (None, true, fetch_start),
            }
        };

        let filter = SelectFilter {
            updated_after: since,
        };
        debug!("Pulling '{}' updated after {:?}", table, since);
        let fetched = self
            .inner
            .remote
            .select(table, &filter)
            .await
            .map_err(|source| SyncError::Pull {
                table: table.to_string(),
                source,
            })?;
        let fetched_count = fetched.len();

        let mut cache = self.inner.cache.write().await;
        let mut records = collection::load_or_empty(&mut cache, table)?;
        merge_records(&mut records, fetched);

        let pending = load_log(&mut cache)?;
        patch::rebase(&mut records, pending.iter().filter(|m| m.table == table));
        collection::store(&mut cache, table, &records)?;

        let committed = watermark::commit(&mut cache, table, fetch_start)?;
        debug!("Pulled {} records for '{}'", fetched_count, table);

        Ok(TablePull {
            table: table.to_string(),
            fetched: fetched_count,
            watermark: committed,
            full,
        })
    }
}
