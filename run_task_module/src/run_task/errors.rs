use scheduler_module::{SchedulerError, TaskStatus};
use send_message_module::SendError;
use std::fmt;
use std::io;
use std::path::PathBuf;

use super::constants::{EXIT_FAILURE, EXIT_USAGE};

#[derive(Debug)]
pub enum RunTaskError {
    Io(io::Error),
    MissingArgument,
    InstructionMissing {
        path: PathBuf,
    },
    InvalidInstruction {
        path: PathBuf,
        reason: String,
    },
    StoreUnavailable {
        task_id: i64,
    },
    TaskNotRunnable {
        task_id: i64,
        status: Option<TaskStatus>,
    },
    /// Configuration, selector catalog or WebDriver client could not be
    /// prepared, so no session was attempted.
    Setup(String),
    Store(SchedulerError),
    Send(SendError),
}

impl RunTaskError {
    /// Usage and instruction problems are told apart from failed sends so
    /// the caller can distinguish "never attempted" from "attempted and
    /// failed".
    pub fn exit_code(&self) -> i32 {
        match self {
            RunTaskError::MissingArgument
            | RunTaskError::InstructionMissing { .. }
            | RunTaskError::InvalidInstruction { .. } => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for RunTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTaskError::Io(err) => write!(f, "I/O error: {}", err),
            RunTaskError::MissingArgument => {
                write!(f, "Missing argument: path to the instruction file")
            }
            RunTaskError::InstructionMissing { path } => {
                write!(f, "Instruction file not found: {}", path.display())
            }
            RunTaskError::InvalidInstruction { path, reason } => write!(
                f,
                "Invalid instruction file {}: {}",
                path.display(),
                reason
            ),
            RunTaskError::StoreUnavailable { task_id } => {
                write!(f, "Task store unavailable for task {}", task_id)
            }
            RunTaskError::TaskNotRunnable { task_id, status } => match status {
                Some(status) => write!(f, "Task {} is {}, not pending; skipped", task_id, status),
                None => write!(f, "Task {} no longer exists; skipped", task_id),
            },
            RunTaskError::Setup(reason) => write!(f, "Executor setup failed: {}", reason),
            RunTaskError::Store(err) => write!(f, "Task store error: {}", err),
            RunTaskError::Send(err) => write!(f, "Send failed: {}", err),
        }
    }
}

impl std::error::Error for RunTaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunTaskError::Io(err) => Some(err),
            RunTaskError::Store(err) => Some(err),
            RunTaskError::Send(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RunTaskError {
    fn from(err: io::Error) -> Self {
        RunTaskError::Io(err)
    }
}

impl From<SchedulerError> for RunTaskError {
    fn from(err: SchedulerError) -> Self {
        RunTaskError::Store(err)
    }
}

impl From<SendError> for RunTaskError {
    fn from(err: SendError) -> Self {
        RunTaskError::Send(err)
    }
}
