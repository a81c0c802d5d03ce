//! Connectivity Probe Task
//!
//! Background task that periodically pings the remote service and feeds the
//! result into the connectivity monitor.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connectivity::ConnectivityMonitor;
use crate::remote::SharedRemote;

/// Spawns a task that marks the monitor online whenever `remote` answers a
/// ping and offline whenever it does not.
///
/// # Arguments
/// * `remote` - Service to ping
/// * `monitor` - Monitor to update
/// * `probe_interval` - Delay between pings
pub fn spawn_connectivity_probe(
    remote: SharedRemote,
    monitor: ConnectivityMonitor,
    probe_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting connectivity probe with interval of {} seconds",
            probe_interval.as_secs()
        );

        loop {
            tokio::time::sleep(probe_interval).await;

            match remote.ping().await {
                Ok(()) => {
                    monitor.set_online(true);
                }
                Err(err) => {
                    debug!("Connectivity probe failed: {}", err);
                    monitor.set_online(false);
                }
            }
        }
    })
}
