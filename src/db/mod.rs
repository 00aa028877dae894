//! Persistence coordinator.
//!
//! Domain state lives in memory; the store is written behind it and only
//! read at startup.

mod batch;
mod coordinator;
mod load;
mod migrate;
mod rows;

pub use batch::{Write, WriteBatch};
pub use coordinator::{BoxFuture, Coordinator, PendingWrite, WriteMode};
pub use load::{Snapshot, load_snapshot};
pub use migrate::{MIGRATIONS, Migration, applied_versions, migrate};
