//! Task record types and run history.
//!
//! A [`TaskRecord`] is one scheduled unit of work: an id, an absolute due
//! time, a type tag that routes it to a handler, and an opaque JSON payload
//! that only the matching handler interprets. Run history records what the
//! scheduler actually did with each dispatched task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a scheduled task.
///
/// Persistent tasks get their id from the store (SQLite rowid); runtime-only
/// tasks are numbered from a separate in-memory counter whose range never
/// overlaps store rowids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TaskId(i64);

impl TaskId {
    /// Wrap a raw id value.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw id value.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A unit of work scheduled for future execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Record identity, immutable once assigned.
    pub id: TaskId,
    /// The task becomes due once current time reaches this value.
    pub execution_time: DateTime<Utc>,
    /// Routes the record to its registered handler.
    pub task_type: String,
    /// Opaque payload, decoded by the handler into its typed form.
    pub payload: serde_json::Value,
    /// Human-readable label for logs and audit. Never load-bearing.
    pub description: String,
    /// If true, the record is never written to the store and does not
    /// survive a restart.
    pub runtime_only: bool,
}

impl TaskRecord {
    /// Returns `true` once the record's due time has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execution_time <= now
    }
}

/// What happened to a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunOutcome {
    /// Handler returned success; the record is gone.
    Completed,
    /// Handler returned an error; `on_failure` ran after teardown.
    Failed,
    /// No handler registered for the record's type; record discarded.
    Dropped,
}

/// One entry in the scheduler's bounded run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunRecord {
    /// Id of the dispatched record.
    pub task_id: TaskId,
    /// Type tag of the dispatched record.
    pub task_type: String,
    /// When dispatch started.
    pub started_at: DateTime<Utc>,
    /// When the execution (or drop) finished.
    pub finished_at: DateTime<Utc>,
    /// How the run ended.
    pub outcome: TaskRunOutcome,
    /// Short human summary (the record description, or the error text).
    pub summary: String,
}

/// Point-in-time view of scheduler state for doctor/status tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Queued records, in execution-time order.
    pub pending: Vec<TaskRecord>,
    /// Recent run history, oldest first.
    #[serde(default)]
    pub history: Vec<TaskRunRecord>,
}

/// Default description when a handler does not override `describe`.
pub(crate) fn default_description(task_type: &str, at: DateTime<Utc>) -> String {
    format!("{task_type} @ {}", at.format("%Y-%m-%d %H:%M:%S UTC"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn due_is_inclusive_of_now() {
        let now = Utc::now();
        let record = TaskRecord {
            id: TaskId::new(1),
            execution_time: now,
            task_type: "t".to_owned(),
            payload: serde_json::json!({}),
            description: String::new(),
            runtime_only: false,
        };
        assert!(record.is_due(now));
        assert!(record.is_due(now + TimeDelta::seconds(1)));
        assert!(!record.is_due(now - TimeDelta::seconds(1)));
    }

    #[test]
    fn default_description_names_type_and_time() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T09:30:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        let desc = default_description("reminder", at);
        assert_eq!(desc, "reminder @ 2026-03-01 09:30:00 UTC");
    }

    #[test]
    fn snapshot_serde_round_trip() {
        let snapshot = SchedulerSnapshot {
            pending: vec![TaskRecord {
                id: TaskId::new(7),
                execution_time: Utc::now(),
                task_type: "cleanup".to_owned(),
                payload: serde_json::json!({"msg_id": 42}),
                description: "cleanup".to_owned(),
                runtime_only: false,
            }],
            history: vec![TaskRunRecord {
                task_id: TaskId::new(3),
                task_type: "cleanup".to_owned(),
                started_at: Utc::now(),
                finished_at: Utc::now(),
                outcome: TaskRunOutcome::Completed,
                summary: "ok".to_owned(),
            }],
        };

        let json = serde_json::to_string(&snapshot).expect("serialize");
        let restored: SchedulerSnapshot = serde_json::from_str(&json).expect("parse");
        assert_eq!(restored.pending.len(), 1);
        assert_eq!(restored.pending[0].id, TaskId::new(7));
        assert_eq!(restored.history[0].outcome, TaskRunOutcome::Completed);
    }
}
