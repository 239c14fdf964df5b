//! SQLite-backed task store.
//!
//! One database file holds the pending durable tasks. Thread-safe via an
//! internal `Mutex<Connection>`: the scheduler's completion paths may call
//! `delete` concurrently from several tasks, and every call serializes
//! through the mutex.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, params};

use super::schema::apply_schema;
use super::{NewTask, TaskStore};
use crate::error::{Error, Result};
use crate::task::{TaskId, TaskRecord};

/// SQLite-backed [`TaskStore`].
pub struct SqliteTaskStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path`, creating parent directories
    /// as needed. Applies the schema if the database is new.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database, for tests and ephemeral hosts.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file path, if this store is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Persistence("task store connection mutex poisoned".to_owned()))
    }
}

impl TaskStore for SqliteTaskStore {
    fn save(&self, task: &NewTask) -> Result<TaskId> {
        let conn = self.lock()?;
        let data = serde_json::to_string(&task.payload)
            .map_err(|e| Error::Persistence(format!("cannot serialize payload: {e}")))?;

        conn.execute(
            "INSERT INTO tasks (execution_time, task_type, description, data) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                task.execution_time.timestamp(),
                task.task_type,
                task.description,
                data
            ],
        )?;

        Ok(TaskId::new(conn.last_insert_rowid()))
    }

    fn delete(&self, id: TaskId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.as_i64()])?;
        Ok(())
    }

    fn delete_all_of_type(&self, task_type: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM tasks WHERE task_type = ?1", params![task_type])?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<TaskRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, execution_time, task_type, description, data \
             FROM tasks ORDER BY execution_time ASC, id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, epoch, task_type, description, data) = row?;
            records.push(TaskRecord {
                id: TaskId::new(id),
                execution_time: epoch_to_utc(epoch)?,
                task_type,
                description,
                payload: serde_json::from_str(&data).map_err(|e| {
                    Error::Persistence(format!("corrupt payload for task {id}: {e}"))
                })?,
                runtime_only: false,
            });
        }
        Ok(records)
    }
}

fn epoch_to_utc(epoch: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .ok_or_else(|| Error::Persistence(format!("timestamp '{epoch}' out of range")))
}
