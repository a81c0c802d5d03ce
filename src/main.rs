//! Aurora Sync - Offline-first local cache and reconciliation daemon
//!
//! Serves the cache, mutation queue and sync engine over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use aurora_sync::api::{create_router, AppState};
use aurora_sync::config::Config;
use aurora_sync::connectivity::SharedConnectivity;
use aurora_sync::remote::{InMemoryRemote, PostgrestRemote, SharedRemote};
use aurora_sync::tasks::{spawn_connectivity_probe, spawn_sync_scheduler};

/// Main entry point for the sync daemon.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the remote client, cache, queue and sync engine
/// 4. Start the sync scheduler and connectivity probe
/// 5. Serve the HTTP API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aurora_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Aurora sync daemon");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, prefix={}, default_ttl={}ms, tables={:?}, sync_interval={}ms",
        config.server_port,
        config.cache_prefix,
        config.default_ttl_ms,
        config.sync_tables,
        config.sync_interval_ms
    );

    let remote = build_remote(&config)?;

    let state = AppState::from_config(&config, remote.clone()).context("Failed to open cache")?;
    match &config.cache_file {
        Some(path) => info!("Cache persisted to {}", path.display()),
        None => info!("Cache kept in memory"),
    }

    let connectivity: SharedConnectivity = Arc::new(state.connectivity.clone());
    let mut handles = vec![spawn_sync_scheduler(
        state.engine.clone(),
        connectivity,
        config.sync_interval(),
    )];
    info!("Sync scheduler started");

    match config.probe_interval() {
        Some(interval) => {
            handles.push(spawn_connectivity_probe(
                remote,
                state.connectivity.clone(),
                interval,
            ));
            info!("Connectivity probe started");
        }
        None => info!("Connectivity probe disabled, relying on PUT /connectivity"),
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(handles))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// PostgREST client when a remote URL is configured, otherwise an in-memory
/// stand-in.
fn build_remote(config: &Config) -> anyhow::Result<SharedRemote> {
    let Some(raw) = &config.remote_url else {
        warn!("REMOTE_URL not set, using an in-memory remote; data is not shared");
        return Ok(Arc::new(InMemoryRemote::default()));
    };

    let base = Url::parse(raw).with_context(|| format!("Invalid REMOTE_URL: {}", raw))?;
    let remote = PostgrestRemote::new(&base, config.remote_api_key.as_deref())
        .context("Failed to build remote client")?;
    info!("Remote data service at {}", base);

    Ok(Arc::new(remote))
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the background tasks and allows graceful shutdown.
async fn shutdown_signal(handles: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for handle in handles {
        handle.abort();
    }
    warn!("Background tasks aborted");
}
