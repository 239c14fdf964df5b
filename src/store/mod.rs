//! Durable task storage.
//!
//! The scheduler persists every non-runtime-only record through the
//! [`TaskStore`] trait so pending work survives a process restart. The
//! bundled implementation is [`SqliteTaskStore`]; hosts with their own
//! database layer can implement the trait instead.
//!
//! Calls are independently atomic — no cross-record transactional
//! guarantees are required by the scheduler. Implementations must tolerate
//! concurrent calls from the completion paths of simultaneously running
//! tasks.

mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::task::{TaskId, TaskRecord};

pub use sqlite::SqliteTaskStore;

/// Insert shape for a new durable task. Runtime-only tasks never reach the
/// store, so there is no persistence flag here.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Absolute due time.
    pub execution_time: DateTime<Utc>,
    /// Task-type tag routing the record to its handler.
    pub task_type: String,
    /// Audit/log label.
    pub description: String,
    /// Opaque JSON payload.
    pub payload: serde_json::Value,
}

/// Durable storage consumed by the scheduler.
pub trait TaskStore: Send + Sync {
    /// Insert a record and return its store-assigned id.
    fn save(&self, task: &NewTask) -> Result<TaskId>;

    /// Remove a record by id. Removing an absent id is not an error.
    fn delete(&self, id: TaskId) -> Result<()>;

    /// Remove every record of the given type. Idempotent.
    fn delete_all_of_type(&self, task_type: &str) -> Result<()>;

    /// All persisted records, in `(execution_time, id)` order.
    fn list_all(&self) -> Result<Vec<TaskRecord>>;
}
