mod store;
mod types;
mod utils;

pub use store::{TaskStore, DEFAULT_BUSY_TIMEOUT};
pub use types::{
    SchedulerError, SendMode, StatusCounts, Task, TaskDraft, TaskRef, TaskStatus,
};
pub(crate) use types::validate_content;
pub(crate) use utils::{absolutize, join_attachments, split_attachments};
