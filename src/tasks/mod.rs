//! Background Tasks Module
//!
//! Contains background tasks that run periodically during daemon operation.
//!
//! # Tasks
//! - Sync scheduler: runs sync cycles on an interval and on reconnect
//! - Connectivity probe: pings the remote service to detect online/offline

mod probe;
mod scheduler;

pub use probe::spawn_connectivity_probe;
pub use scheduler::spawn_sync_scheduler;
