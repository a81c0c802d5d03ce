//! Observable sync status.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    /// A cycle is in flight
    pub is_syncing: bool,
    /// Completion time of the last cycle whose pulls all succeeded
    pub last_sync_time: Option<DateTime<Utc>>,
    pub is_online: bool,
    /// Last cycle failure, or a summary of mutations that failed to replay
    pub last_error: Option<String>,
    pub pending_mutations: usize,
    /// Tables whose queue head failed in the last cycle
    pub blocked_tables: Vec<String>,
}
