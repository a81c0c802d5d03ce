//! Sync Scheduler Task
//!
//! Background task driving the sync engine: one cycle at startup, one per
//! interval while online, and one immediately after coming back online.
//! Going offline stops the interval until connectivity returns. A drop and
//! return that both happen while a cycle is running still count as a
//! reconnect.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::connectivity::SharedConnectivity;
use crate::error::SyncError;
use crate::sync::{SyncEngine, SyncOutcome};

/// Spawns the sync scheduler.
///
/// # Arguments
/// * `engine` - Engine to trigger
/// * `connectivity` - Online/offline source
/// * `sync_interval` - Delay between periodic cycles while online, at least 1ms
///
/// # Returns
/// A JoinHandle for the spawned task; abort it to stop scheduling.
pub fn spawn_sync_scheduler(
    engine: SyncEngine,
    connectivity: SharedConnectivity,
    sync_interval: Duration,
) -> JoinHandle<()> {
    let sync_interval = sync_interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        info!(
            "Starting sync scheduler with interval of {} ms",
            sync_interval.as_millis()
        );

        let mut transitions = connectivity.subscribe();
        let mut online = *transitions.borrow_and_update();
        engine.note_connectivity(online);

        if online {
            run_cycle(&engine).await;
        }
        let mut ticker = restart_ticker(sync_interval);

        loop {
            tokio::select! {
                _ = ticker.tick(), if online => {
                    run_cycle(&engine).await;
                }
                changed = transitions.changed() => {
                    if changed.is_err() {
                        info!("Connectivity source closed, stopping sync scheduler");
                        break;
                    }

                    // The monitor only notifies on real transitions, so an
                    // unchanged online value means it dropped and came back
                    let now_online = *transitions.borrow_and_update();
                    if now_online {
                        if online {
                            debug!("Connectivity dropped and returned during a cycle");
                        }
                        online = true;
                        engine.note_connectivity(true);
                        info!("Back online, syncing now");
                        run_cycle(&engine).await;
                        ticker = restart_ticker(sync_interval);
                    } else if online {
                        online = false;
                        engine.note_connectivity(false);
                        info!("Offline, periodic sync paused");
                    }
                }
            }
        }
    })
}

/// Interval whose first tick is one full period away.
fn restart_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run_cycle(engine: &SyncEngine) {
    match engine.force_sync().await {
        Ok(SyncOutcome::Completed(report)) => {
            if !report.drain.is_clean() {
                warn!(
                    "Sync completed with stuck tables: {:?}",
                    report.drain.blocked_tables()
                );
            }
        }
        Ok(SyncOutcome::Coalesced) => debug!("Scheduled sync coalesced with a running cycle"),
        Err(SyncError::Offline) => debug!("Skipped scheduled sync while offline"),
        // Already logged by the engine; the next tick retries
        Err(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::{shared, CacheStore};
    use crate::connectivity::ConnectivityMonitor;
    use crate::models::SchemaRegistry;
    use crate::queue::{MutationQueue, Operation};
    use crate::remote::{CallKind, InMemoryRemote};
    use crate::sync::SyncOptions;
    use serde_json::json;

    fn setup(online: bool) -> (SyncEngine, InMemoryRemote, ConnectivityMonitor) {
        let cache = shared(CacheStore::in_memory());
        let queue = MutationQueue::new(cache.clone(), SchemaRegistry::empty());
        let remote = InMemoryRemote::default();
        let monitor = ConnectivityMonitor::new(online);
        let engine = SyncEngine::new(
            cache,
            queue,
            Arc::new(remote.clone()),
            Arc::new(monitor.clone()),
            SyncOptions {
                tables: vec!["assets".to_string()],
                watermark_overlap: Duration::ZERO,
            },
        );
        (engine, remote, monitor)
    }

    async fn selects(remote: &InMemoryRemote) -> usize {
        remote.calls_of(CallKind::Select).await.len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_syncs_on_start_and_each_interval() {
        let (engine, remote, monitor) = setup(true);
        let handle = spawn_sync_scheduler(engine, Arc::new(monitor), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(selects(&remote).await, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(selects(&remote).await, 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(selects(&remote).await, 3);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_pauses_and_reconnect_syncs_immediately() {
        let (engine, remote, monitor) = setup(false);
        let handle = spawn_sync_scheduler(
            engine.clone(),
            Arc::new(monitor.clone()),
            Duration::from_secs(5),
        );

        // offline from the start: nothing runs
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(selects(&remote).await, 0);

        engine
            .queue()
            .enqueue("assets", Operation::Create, json!({"name": "Car"}))
            .await
            .unwrap();

        monitor.set_online(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(selects(&remote).await, 1);
        assert_eq!(remote.calls_of(CallKind::Insert).await.len(), 1);
        assert!(engine.queue().is_empty().await.unwrap());
        assert!(engine.status().is_online);

        monitor.set_online(false);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(selects(&remote).await, 1);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_during_cycle_triggers_another_sync() {
        let (engine, remote, monitor) = setup(true);
        remote.set_latency(Some(Duration::from_secs(1))).await;
        let handle = spawn_sync_scheduler(
            engine.clone(),
            Arc::new(monitor.clone()),
            Duration::from_secs(60),
        );

        // drop and return while the startup cycle waits on the remote
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.set_online(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.set_online(true);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(selects(&remote).await, 2);
        assert!(engine.status().is_online);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_does_not_stop_scheduler() {
        let (engine, remote, monitor) = setup(true);
        let handle = spawn_sync_scheduler(engine, Arc::new(monitor), Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        assert!(selects(&remote).await >= 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_can_be_aborted() {
        let (engine, _remote, monitor) = setup(true);
        let handle = spawn_sync_scheduler(engine, Arc::new(monitor), Duration::from_secs(1));

        handle.abort();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
