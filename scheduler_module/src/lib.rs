pub mod config;
pub mod controller;
pub mod instruction;
pub mod trigger;

mod scheduler;

pub use config::{AppConfig, ExecutionContext};
pub use controller::{
    BackgroundJob, Controller, ControllerEvent, SendOutcome, SendRequest, TaskSnapshot,
};
pub use instruction::Instruction;
pub use scheduler::{
    SchedulerError, SendMode, StatusCounts, Task, TaskDraft, TaskRef, TaskStatus, TaskStore,
    DEFAULT_BUSY_TIMEOUT,
};
pub use trigger::{
    trigger_name, MemoryOsScheduler, OsScheduler, RegisteredTrigger, SchtasksScheduler,
    TriggerLayout, TriggerManager, TRIGGER_PREFIX,
};
