use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::types::{SchedulerError, StatusCounts, Task, TaskDraft, TaskRef, TaskStatus};
use super::utils::{absolutize, format_datetime, join_attachments, normalize_message};

mod migrations;
mod schema;
mod task_rows;

use migrations::ensure_tasks_columns;
use schema::SCHEDULER_SCHEMA;
use task_rows::{find_status, find_task, query_tasks};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Durable task table shared between the controller and executor
/// processes. Holds only the database path: every call opens its own
/// connection so writes made by other processes are always visible.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SchedulerError> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn with_busy_timeout(
        path: impl Into<PathBuf>,
        busy_timeout: Duration,
    ) -> Result<Self, SchedulerError> {
        let store = Self {
            path: path.into(),
            busy_timeout,
        };
        let _ = store.open()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_task(&self, name: &str, draft: &TaskDraft) -> Result<i64, SchedulerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchedulerError::Validation(
                "task name must not be empty".to_string(),
            ));
        }
        draft.validate(Utc::now())?;
        let attachments = absolutize(&draft.attachments)?;

        let conn = self.open()?;
        let inserted = conn.execute(
            "INSERT INTO tasks (name, target, mode, message, attachments, scheduled_time, created_at, status, attempts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 0)",
            params![
                name,
                draft.target.trim(),
                draft.mode.as_str(),
                normalize_message(draft.message.as_deref()),
                join_attachments(&attachments),
                format_datetime(draft.scheduled_time),
                format_datetime(Utc::now()),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(SchedulerError::DuplicateTaskName(name.to_string()))
            }
            Err(err) => return Err(err.into()),
        }
        let id = conn.last_insert_rowid();
        checkpoint(&conn);
        info!("task {} added as '{}' for {}", id, name, draft.scheduled_time);
        Ok(id)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Task>, SchedulerError> {
        let conn = self.open()?;
        find_task(&conn, &TaskRef::Id(id))
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<Task>, SchedulerError> {
        let conn = self.open()?;
        find_task(&conn, &TaskRef::Name(name.to_string()))
    }

    pub fn get(&self, identifier: impl Into<TaskRef>) -> Result<Option<Task>, SchedulerError> {
        let conn = self.open()?;
        find_task(&conn, &identifier.into())
    }

    /// Every row, latest schedule first.
    pub fn list_all(&self) -> Result<Vec<Task>, SchedulerError> {
        let conn = self.open()?;
        query_tasks(&conn, "", "scheduled_time DESC, id DESC", &[])
    }

    /// Pending rows, earliest schedule first.
    pub fn list_pending(&self) -> Result<Vec<Task>, SchedulerError> {
        let conn = self.open()?;
        query_tasks(
            &conn,
            "WHERE status = ?1",
            "scheduled_time ASC, id ASC",
            &[&TaskStatus::Pending.as_str()],
        )
    }

    /// Moves a task to `status` inside an immediate transaction, forces a
    /// WAL checkpoint, then reads the row back on a new connection and
    /// fails with `StatusMismatch` if another writer got in between.
    ///
    /// Re-applying the current status leaves the row untouched, so
    /// `executed_at` and `attempts` do not move on repeated calls.
    pub fn update_status(
        &self,
        identifier: impl Into<TaskRef>,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<Task, SchedulerError> {
        let identifier = identifier.into();
        let id = {
            let mut conn = self.open()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (id, current) = find_status(&tx, &identifier)?
                .ok_or_else(|| SchedulerError::NotFound(identifier.clone()))?;
            if current == status {
                tx.commit()?;
                id
            } else {
                if !current.can_transition_to(status) {
                    return Err(SchedulerError::InvalidTransition {
                        id,
                        from: current,
                        to: status,
                    });
                }
                match status {
                    TaskStatus::Running => {
                        tx.execute(
                            "UPDATE tasks SET status = ?1, attempts = attempts + 1 WHERE id = ?2",
                            params![status.as_str(), id],
                        )?;
                    }
                    _ => {
                        let error_message = match status {
                            TaskStatus::Failed => error_message.map(str::to_string),
                            _ => None,
                        };
                        tx.execute(
                            "UPDATE tasks SET status = ?1, executed_at = ?2, error_message = ?3 WHERE id = ?4",
                            params![
                                status.as_str(),
                                format_datetime(Utc::now()),
                                error_message,
                                id
                            ],
                        )?;
                    }
                }
                tx.commit()?;
                checkpoint(&conn);
                info!("task {} status {} -> {}", id, current, status);
                id
            }
        };

        let verified = self.get_by_id(id)?;
        match verified {
            Some(task) if task.status == status => Ok(task),
            Some(task) => {
                warn!(
                    "task {} status check failed: wrote {}, found {}",
                    id, status, task.status
                );
                Err(SchedulerError::StatusMismatch {
                    id,
                    expected: status,
                    found: task.status.to_string(),
                })
            }
            None => Err(SchedulerError::StatusMismatch {
                id,
                expected: status,
                found: "missing".to_string(),
            }),
        }
    }

    /// Replaces the editable fields of a non-running task and puts it back
    /// to pending with no execution history.
    pub fn update_full(&self, id: i64, draft: &TaskDraft) -> Result<Task, SchedulerError> {
        {
            let mut conn = self.open()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (_, current) = find_status(&tx, &TaskRef::Id(id))?
                .ok_or(SchedulerError::NotFound(TaskRef::Id(id)))?;
            if current == TaskStatus::Running {
                return Err(SchedulerError::TaskRunning(id));
            }
            draft.validate(Utc::now())?;
            let attachments = absolutize(&draft.attachments)?;
            tx.execute(
                "UPDATE tasks
                 SET target = ?1, mode = ?2, message = ?3, attachments = ?4, scheduled_time = ?5,
                     status = 'pending', executed_at = NULL, error_message = NULL
                 WHERE id = ?6",
                params![
                    draft.target.trim(),
                    draft.mode.as_str(),
                    normalize_message(draft.message.as_deref()),
                    join_attachments(&attachments),
                    format_datetime(draft.scheduled_time),
                    id
                ],
            )?;
            tx.commit()?;
            checkpoint(&conn);
        }
        info!("task {} updated, rescheduled for {}", id, draft.scheduled_time);
        self.get_by_id(id)?
            .ok_or(SchedulerError::NotFound(TaskRef::Id(id)))
    }

    /// Removes the row. Returns `false` when there was nothing to delete.
    pub fn delete(&self, identifier: impl Into<TaskRef>) -> Result<bool, SchedulerError> {
        let identifier = identifier.into();
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some((id, current)) = find_status(&tx, &identifier)? else {
            return Ok(false);
        };
        if current == TaskStatus::Running {
            return Err(SchedulerError::TaskRunning(id));
        }
        tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        tx.commit()?;
        checkpoint(&conn);
        info!("task {} deleted", id);
        Ok(true)
    }

    /// Soft delete: the row stays for history, marked cancelled.
    pub fn cancel(&self, identifier: impl Into<TaskRef>) -> Result<Task, SchedulerError> {
        self.update_status(identifier, TaskStatus::Cancelled, None)
    }

    pub fn count_by_status(&self) -> Result<StatusCounts, SchedulerError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            counts.add(status.parse()?, usize::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    fn open(&self) -> Result<Connection, SchedulerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(SCHEDULER_SCHEMA)?;
        ensure_tasks_columns(&conn)?;
        Ok(conn)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _)
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Flushes the WAL into the main file so a process that opens the database
/// next sees the write even if this one dies right after. Failure only
/// delays the flush, so it is logged and ignored.
fn checkpoint(conn: &Connection) {
    if let Err(err) = conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(())) {
        warn!("wal checkpoint failed: {}", err);
    }
}
