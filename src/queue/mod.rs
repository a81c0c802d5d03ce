//! Offline Mutation Queue Module
//!
//! Pending writes recorded while offline (or before acknowledgment), their
//! optimistic application to cached collections, and their replay.

mod mutation;
mod mutation_queue;
pub mod patch;

pub use mutation::{MutationPayload, Operation, PendingMutation};
pub use mutation_queue::{DrainReport, FailedMutation, MutationQueue, QUEUE_KEY};

pub(crate) use mutation_queue::load_log;
