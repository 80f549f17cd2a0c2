use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What a task sends. Each mode carries its own required-field rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    Text,
    File,
    FileText,
}

impl SendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendMode::Text => "text",
            SendMode::File => "file",
            SendMode::FileText => "file_text",
        }
    }

    pub fn requires_message(&self) -> bool {
        matches!(self, SendMode::Text | SendMode::FileText)
    }

    pub fn requires_attachments(&self) -> bool {
        matches!(self, SendMode::File | SendMode::FileText)
    }
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SendMode {
    type Err = SchedulerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(SendMode::Text),
            "file" => Ok(SendMode::File),
            "file_text" => Ok(SendMode::FileText),
            other => Err(SchedulerError::Validation(format!(
                "unknown send mode '{}' (expected text, file or file_text)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Transitions accepted by `TaskStore::update_status`. Re-applying the
    /// current status is always allowed and leaves the row untouched.
    /// Resetting to pending goes through `TaskStore::update_full` instead.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(SchedulerError::Storage(format!(
                "unknown task status {}",
                other
            ))),
        }
    }
}

/// A persisted send request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub target: String,
    pub mode: SendMode,
    pub message: Option<String>,
    pub attachments: Vec<PathBuf>,
    pub scheduled_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub error_message: Option<String>,
}

/// The user-editable part of a task, shared by create and edit.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub target: String,
    pub mode: SendMode,
    pub message: Option<String>,
    pub attachments: Vec<PathBuf>,
    pub scheduled_time: DateTime<Utc>,
}

impl TaskDraft {
    pub fn new(target: impl Into<String>, mode: SendMode, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            target: target.into(),
            mode,
            message: None,
            attachments: Vec::new(),
            scheduled_time,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_attachments<I, P>(mut self, attachments: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.attachments = attachments.into_iter().map(Into::into).collect();
        self
    }

    /// Target and mode rules, without the schedule check. Used for
    /// immediate sends, which have no scheduled time.
    pub fn validate_content(&self) -> Result<(), SchedulerError> {
        validate_content(
            &self.target,
            self.mode,
            self.message.as_deref(),
            &self.attachments,
        )
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.validate_content()?;
        if self.scheduled_time <= now {
            return Err(SchedulerError::Validation(format!(
                "scheduled time {} is not in the future",
                self.scheduled_time.to_rfc3339()
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_content(
    target: &str,
    mode: SendMode,
    message: Option<&str>,
    attachments: &[PathBuf],
) -> Result<(), SchedulerError> {
    if target.trim().is_empty() {
        return Err(SchedulerError::Validation(
            "target must not be empty".to_string(),
        ));
    }
    let has_message = message.map(str::trim).is_some_and(|value| !value.is_empty());
    let has_attachments = attachments
        .iter()
        .any(|path| !path.as_os_str().is_empty());
    match mode {
        SendMode::Text if !has_message => Err(SchedulerError::Validation(
            "mode 'text' requires a message".to_string(),
        )),
        SendMode::File if !has_attachments => Err(SchedulerError::Validation(
            "mode 'file' requires at least one attachment".to_string(),
        )),
        SendMode::FileText if !has_attachments || !has_message => {
            Err(SchedulerError::Validation(
                "mode 'file_text' requires a message and at least one attachment".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

/// Rows can be addressed by id or by unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    Id(i64),
    Name(String),
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::Id(id) => write!(f, "id {}", id),
            TaskRef::Name(name) => write!(f, "name '{}'", name),
        }
    }
}

impl From<i64> for TaskRef {
    fn from(value: i64) -> Self {
        TaskRef::Id(value)
    }
}

impl From<&str> for TaskRef {
    fn from(value: &str) -> Self {
        TaskRef::Name(value.to_string())
    }
}

impl From<String> for TaskRef {
    fn from(value: String) -> Self {
        TaskRef::Name(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Running => self.running,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
            TaskStatus::Cancelled => self.cancelled,
        }
    }

    pub(crate) fn add(&mut self, status: TaskStatus, count: usize) {
        match status {
            TaskStatus::Pending => self.pending += count,
            TaskStatus::Running => self.running += count,
            TaskStatus::Completed => self.completed += count,
            TaskStatus::Failed => self.failed += count,
            TaskStatus::Cancelled => self.cancelled += count,
        }
    }

    pub fn total(&self) -> usize {
        TaskStatus::ALL.iter().map(|status| self.get(*status)).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("task name '{0}' already exists")]
    DuplicateTaskName(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("task not found: {0}")]
    NotFound(TaskRef),
    #[error("task {0} is running and cannot be modified")]
    TaskRunning(i64),
    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("task {id} status check failed: wrote {expected}, store reports {found}")]
    StatusMismatch {
        id: i64,
        expected: TaskStatus,
        found: String,
    },
    #[error("trigger registration failed: {0}")]
    TriggerRegistration(String),
    #[error("trigger removal failed: {0}")]
    TriggerRemoval(String),
    #[error("executor error: {0}")]
    Executor(String),
    #[error("configuration error: {0}")]
    Config(String),
}
