//! API Handlers
//!
//! HTTP request handlers for each daemon endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::cache::{
    self, CacheStore, FileStorage, GetOptions, MemoryStorage, SetOptions, SharedCache, Storage,
};
use crate::clock::{SharedClock, SystemClock};
use crate::collection;
use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe};
use crate::error::{ApiError, CacheError, Result};
use crate::models::{
    ClearResponse, CollectionResponse, ConnectivityRequest, DeleteResponse, EnqueueRequest,
    GetQuery, GetResponse, HealthResponse, QueueResponse, SchemaRegistry, SetRequest,
    SetResponse, StatsResponse, SyncStatusResponse,
};
use crate::queue::{MutationQueue, PendingMutation};
use crate::remote::SharedRemote;
use crate::sync::{SyncEngine, SyncOptions, SyncOutcome, SyncStatus};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe cache store
    pub cache: SharedCache,
    pub queue: MutationQueue,
    pub engine: SyncEngine,
    /// Host connectivity signal
    pub connectivity: ConnectivityMonitor,
}

impl AppState {
    /// Wires the queue and sync engine around an existing cache store.
    pub fn new(
        store: CacheStore,
        remote: SharedRemote,
        connectivity: ConnectivityMonitor,
        options: SyncOptions,
    ) -> Self {
        let cache = cache::shared(store);
        let queue = MutationQueue::new(cache.clone(), SchemaRegistry::builtin());
        let engine = SyncEngine::new(
            cache.clone(),
            queue.clone(),
            remote,
            Arc::new(connectivity.clone()),
            options,
        );

        Self {
            cache,
            queue,
            engine,
            connectivity,
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens the cache file when one is configured. The daemon starts online;
    /// the probe task or the host corrects that.
    pub fn from_config(
        config: &Config,
        remote: SharedRemote,
    ) -> std::result::Result<Self, CacheError> {
        let storage: Box<dyn Storage> = match &config.cache_file {
            Some(path) => Box::new(FileStorage::open(path)?),
            None => Box::new(MemoryStorage::new()),
        };
        let clock: SharedClock = Arc::new(SystemClock);
        let store = CacheStore::new(
            storage,
            clock,
            config.cache_prefix.clone(),
            config.default_ttl(),
        );
        let options = SyncOptions {
            tables: config.sync_tables.clone(),
            watermark_overlap: config.watermark_overlap(),
        };

        Ok(Self::new(
            store,
            remote,
            ConnectivityMonitor::new(true),
            options,
        ))
    }
}

// == Cache ==
/// Handler for PUT /cache/:key
///
/// Stores a value with an optional TTL, or without expiry when `persistent`.
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    let options = if req.persistent {
        SetOptions::persistent()
    } else {
        match req.ttl_ms {
            Some(ms) => SetOptions::ttl(Duration::from_millis(ms)),
            None => SetOptions::default(),
        }
    };

    let mut cache = state.cache.write().await;
    cache.set_value(&key, req.value, options)?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for GET /cache/:key
///
/// Returns 404 for missing or expired entries, and always when
/// `force_refresh` is set.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<GetQuery>,
) -> Result<Json<GetResponse>> {
    // Write lock: expired entries are evicted on read and stats are updated
    let mut cache = state.cache.write().await;
    let options = GetOptions {
        force_refresh: query.force_refresh,
    };

    match cache.get_value(&key, options)? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(ApiError::NotFound(key)),
    }
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let mut cache = state.cache.write().await;
    cache.remove(&key)?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /cache
///
/// Removes every key in this cache's namespace.
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let mut cache = state.cache.write().await;
    let removed = cache.clear()?;

    Ok(Json(ClearResponse { removed }))
}

/// Handler for GET /tables/:table
///
/// Returns the locally cached collection, including optimistic changes.
pub async fn collection_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<CollectionResponse>> {
    let mut cache = state.cache.write().await;
    let records = collection::load_or_empty(&mut cache, &table)?;

    Ok(Json(CollectionResponse::new(table, records)))
}

// == Queue ==
/// Handler for POST /queue
pub async fn enqueue_handler(
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<PendingMutation>)> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let mutation = state
        .queue
        .enqueue(&req.table, req.operation, req.payload)
        .await?;

    Ok((StatusCode::CREATED, Json(mutation)))
}

/// Handler for GET /queue
pub async fn queue_handler(State(state): State<AppState>) -> Result<Json<QueueResponse>> {
    let pending = state.queue.pending().await?;
    Ok(Json(QueueResponse::new(pending)))
}

/// Handler for DELETE /queue/:id
///
/// Drops one pending mutation without replaying it.
pub async fn abandon_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PendingMutation>> {
    let mutation_id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::InvalidRequest(format!("Invalid mutation id: {}", id)))?;
    let mutation = state.queue.abandon(mutation_id).await?;

    Ok(Json(mutation))
}

/// Handler for DELETE /queue
pub async fn clear_queue_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let removed = state.queue.clear().await?;
    Ok(Json(ClearResponse { removed }))
}

// == Sync ==
/// Handler for POST /sync
///
/// Runs a cycle now, or reports that one is already in flight.
pub async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncOutcome>> {
    let outcome = state.engine.force_sync().await?;
    Ok(Json(outcome))
}

/// Handler for GET /sync/status
pub async fn sync_status_handler(
    State(state): State<AppState>,
) -> Result<Json<SyncStatusResponse>> {
    let status = state.engine.status();
    let watermarks = state.engine.watermarks().await?;

    Ok(Json(SyncStatusResponse { status, watermarks }))
}

/// Handler for PUT /connectivity
///
/// Forwards the host's online/offline signal; the scheduler reacts to the
/// transition.
pub async fn connectivity_handler(
    State(state): State<AppState>,
    Json(req): Json<ConnectivityRequest>,
) -> Json<SyncStatus> {
    state.connectivity.set_online(req.online);
    state.engine.note_connectivity(state.connectivity.is_online());

    Json(state.engine.status())
}

// == Diagnostics ==
/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.cache.read().await;
    Json(StatsResponse::from(cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
