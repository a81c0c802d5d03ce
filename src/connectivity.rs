//! Connectivity Module
//!
//! Online/offline signal consumed by the sync scheduler.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

// == Connectivity Probe ==
/// Source of the online/offline state and its transitions.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver notified on every transition.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Shared handle to a probe.
pub type SharedConnectivity = Arc<dyn ConnectivityProbe>;

// == Connectivity Monitor ==
/// Probe driven by explicit signals: the host environment, the reachability
/// probe task, or tests.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self {
            state: Arc::new(state),
        }
    }

    /// Records the current state. Returns true if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
        changed
    }
}

impl ConnectivityProbe for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
