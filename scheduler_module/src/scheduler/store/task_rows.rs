use rusqlite::{params, Connection, OptionalExtension, Row};

use super::super::types::{SchedulerError, Task, TaskRef, TaskStatus};
use super::super::utils::{parse_datetime, parse_optional_datetime, split_attachments};
use super::schema::TASK_COLUMNS;

/// Raw column values as SQLite hands them back; parsed into a `Task`
/// outside the rusqlite row callback so parse failures keep their type.
pub(super) struct TaskRow {
    id: i64,
    name: String,
    target: String,
    mode: String,
    message: Option<String>,
    attachments: Option<String>,
    scheduled_time: String,
    created_at: String,
    status: String,
    executed_at: Option<String>,
    attempts: i64,
    error_message: Option<String>,
}

impl TaskRow {
    pub(super) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            target: row.get(2)?,
            mode: row.get(3)?,
            message: row.get(4)?,
            attachments: row.get(5)?,
            scheduled_time: row.get(6)?,
            created_at: row.get(7)?,
            status: row.get(8)?,
            executed_at: row.get(9)?,
            attempts: row.get(10)?,
            error_message: row.get(11)?,
        })
    }

    pub(super) fn into_task(self) -> Result<Task, SchedulerError> {
        let mode = self.mode.parse().map_err(|_| {
            SchedulerError::Storage(format!("unknown mode {} for task {}", self.mode, self.id))
        })?;
        Ok(Task {
            id: self.id,
            name: self.name,
            target: self.target,
            mode,
            message: self.message,
            attachments: self
                .attachments
                .as_deref()
                .map(split_attachments)
                .unwrap_or_default(),
            scheduled_time: parse_datetime(&self.scheduled_time)?,
            created_at: parse_datetime(&self.created_at)?,
            status: self.status.parse()?,
            executed_at: parse_optional_datetime(self.executed_at.as_deref())?,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            error_message: self.error_message,
        })
    }
}

pub(super) fn query_tasks(
    conn: &Connection,
    filter: &str,
    order: &str,
    bind: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Task>, SchedulerError> {
    let sql = format!("SELECT {} FROM tasks {} ORDER BY {}", TASK_COLUMNS, filter, order);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(bind, TaskRow::read)?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?.into_task()?);
    }
    Ok(tasks)
}

pub(super) fn find_task(conn: &Connection, identifier: &TaskRef) -> Result<Option<Task>, SchedulerError> {
    let row = match identifier {
        TaskRef::Id(id) => conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![id],
                TaskRow::read,
            )
            .optional()?,
        TaskRef::Name(name) => conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE name = ?1", TASK_COLUMNS),
                params![name],
                TaskRow::read,
            )
            .optional()?,
    };
    row.map(TaskRow::into_task).transpose()
}

/// Id and status only; used inside write transactions before deciding
/// whether a change is allowed.
pub(super) fn find_status(
    conn: &Connection,
    identifier: &TaskRef,
) -> Result<Option<(i64, TaskStatus)>, SchedulerError> {
    let row = match identifier {
        TaskRef::Id(id) => conn
            .query_row(
                "SELECT id, status FROM tasks WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?,
        TaskRef::Name(name) => conn
            .query_row(
                "SELECT id, status FROM tasks WHERE name = ?1",
                params![name],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?,
    };
    match row {
        Some((id, status)) => Ok(Some((id, status.parse()?))),
        None => Ok(None),
    }
}
