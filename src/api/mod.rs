//! API Module
//!
//! HTTP handlers and routing for the sync daemon REST API.
//!
//! # Endpoints
//! - `PUT|GET|DELETE /cache/:key` - Cache entry access
//! - `DELETE /cache` - Clear the cache namespace
//! - `GET /tables/:table` - Locally cached collection
//! - `POST|GET|DELETE /queue` - Offline mutation queue
//! - `DELETE /queue/:id` - Abandon one mutation
//! - `POST /sync` - Force a sync cycle
//! - `GET /sync/status` - Sync status and watermarks
//! - `PUT /connectivity` - Host online/offline signal
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
