//! Reconciliation Sync Module
//!
//! Drains the mutation queue and pulls incremental remote changes into the
//! cache.

mod engine;
pub mod merge;
mod status;
pub mod watermark;

pub use engine::{SyncEngine, SyncOptions, SyncOutcome, SyncReport, TablePull};
pub use status::SyncStatus;
pub use watermark::SyncWatermark;
