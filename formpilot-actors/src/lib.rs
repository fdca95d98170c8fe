//! Minimal actor runtime plus the two shared-state actors of the pipeline:
//! the job queue (exactly-one dispatch, at-most-one active worker per run)
//! and the TTL artifact store (sqlx/SQLite, expiry-filtered reads, periodic
//! sweep).
pub mod actor;
pub mod builder;
pub mod queue;
pub mod registry;
pub mod store;
pub mod supervise;
pub mod system;

pub use queue::{QueueActor, QueueMsg};
pub use store::{StoreActor, StoreMsg, StoredArtifact};
