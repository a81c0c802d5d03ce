//! Aurora Sync - Offline-first local cache and reconciliation daemon
//!
//! Provides a namespaced TTL cache, a durable queue of offline writes and a
//! sync engine that replays those writes and pulls remote changes
//! incrementally.

pub mod api;
pub mod cache;
pub mod clock;
pub mod collection;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod models;
pub mod queue;
pub mod remote;
pub mod sync;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::{spawn_connectivity_probe, spawn_sync_scheduler};
