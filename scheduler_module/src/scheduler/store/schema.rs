pub(super) const SCHEDULER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    target TEXT NOT NULL,
    mode TEXT NOT NULL CHECK (mode IN ('text', 'file', 'file_text')),
    message TEXT,
    attachments TEXT,
    scheduled_time TEXT NOT NULL,
    created_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'running', 'completed', 'failed', 'cancelled')),
    executed_at TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_status_scheduled
    ON tasks (status, scheduled_time);
"#;

pub(super) const TASK_COLUMNS: &str = "id, name, target, mode, message, attachments, scheduled_time, created_at, status, executed_at, attempts, error_message";
