//! Data models
//!
//! Records and their table schemas, plus the DTOs used for
//! serializing/deserializing HTTP request and response bodies.

mod record;
pub mod requests;
pub mod responses;
pub mod schema;

pub use record::{
    is_placeholder_id, placeholder_id, Record, ID_FIELD, PLACEHOLDER_PREFIX, UPDATED_AT_FIELD,
};
pub use requests::{ConnectivityRequest, EnqueueRequest, GetQuery, SetRequest};
pub use responses::{
    ClearResponse, CollectionResponse, DeleteResponse, ErrorResponse, GetResponse,
    HealthResponse, QueueResponse, SetResponse, StatsResponse, SyncStatusResponse,
};
pub use schema::{SchemaRegistry, TableSchema};
