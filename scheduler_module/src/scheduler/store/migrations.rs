use rusqlite::Connection;
use std::collections::HashSet;

use super::super::types::SchedulerError;

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, SchedulerError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }
    Ok(columns)
}

/// Databases created before attempt tracking lack the `attempts` column.
pub(super) fn ensure_tasks_columns(conn: &Connection) -> Result<(), SchedulerError> {
    let columns = table_columns(conn, "tasks")?;
    if !columns.contains("attempts") {
        conn.execute(
            "ALTER TABLE tasks ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !columns.contains("error_message") {
        conn.execute("ALTER TABLE tasks ADD COLUMN error_message TEXT", [])?;
    }
    Ok(())
}
