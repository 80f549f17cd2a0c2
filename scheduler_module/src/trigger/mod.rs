//! One-shot OS triggers that launch the executor at a task's scheduled time.

mod artifacts;
mod command;
mod memory;
mod windows;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::instruction::{sidecar_path, Instruction};
use crate::scheduler::SchedulerError;

pub use memory::{MemoryOsScheduler, Registration};
pub use windows::{SchtasksScheduler, DEFAULT_DATE_FORMAT, DEFAULT_OS_CALL_TIMEOUT};

pub(crate) use command::{run_command_with_timeout, tail_string};

pub const TRIGGER_PREFIX: &str = "AutoMessage_";

pub fn trigger_name(task_id: i64) -> String {
    format!("{}{}", TRIGGER_PREFIX, task_id)
}

/// The OS facility that owns named one-shot timers.
pub trait OsScheduler: Send + Sync {
    /// Creates or replaces the trigger `name`, running `command` once at the
    /// given local wall-clock time. Errors carry the OS diagnostic text.
    fn create_one_shot(
        &self,
        name: &str,
        command: &str,
        run_at: NaiveDateTime,
    ) -> Result<(), SchedulerError>;

    /// Removes the trigger. `Ok(false)` when it did not exist.
    fn delete(&self, name: &str) -> Result<bool, SchedulerError>;

    fn exists(&self, name: &str) -> Result<bool, SchedulerError>;
}

/// Where generated trigger artifacts go and what they launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerLayout {
    pub base_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub executor_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTrigger {
    pub name: String,
    pub instruction_path: PathBuf,
    pub launcher_path: PathBuf,
    pub wrapper_path: PathBuf,
    pub run_at: NaiveDateTime,
}

#[derive(Debug)]
pub struct TriggerManager<S> {
    layout: TriggerLayout,
    os: S,
}

impl<S: OsScheduler> TriggerManager<S> {
    pub fn new(layout: TriggerLayout, os: S) -> Self {
        Self { layout, os }
    }

    pub fn layout(&self) -> &TriggerLayout {
        &self.layout
    }

    pub fn os(&self) -> &S {
        &self.os
    }

    pub fn instruction_path(&self, task_id: i64) -> PathBuf {
        self.layout.tasks_dir.join(format!("task_{}.json", task_id))
    }

    pub fn launcher_path(&self, task_id: i64) -> PathBuf {
        self.layout.tasks_dir.join(format!("task_{}.bat", task_id))
    }

    pub fn wrapper_path(&self, task_id: i64) -> PathBuf {
        self.layout.tasks_dir.join(format!("task_{}.vbs", task_id))
    }

    /// Writes the instruction, launcher and silent wrapper for `task_id`,
    /// then registers `AutoMessage_<id>` at the local time matching
    /// `scheduled_time`. Any failure is a `TriggerRegistration` error and
    /// leaves no artifacts behind; removing the task row is the caller's job.
    pub fn register_trigger(
        &self,
        task_id: i64,
        send: &Instruction,
        scheduled_time: DateTime<Utc>,
    ) -> Result<RegisteredTrigger, SchedulerError> {
        let name = trigger_name(task_id);
        let run_at = scheduled_time.with_timezone(&Local).naive_local();
        let trigger = RegisteredTrigger {
            name: name.clone(),
            instruction_path: self.instruction_path(task_id),
            launcher_path: self.launcher_path(task_id),
            wrapper_path: self.wrapper_path(task_id),
            run_at,
        };

        if let Err(err) = self.write_artifacts(task_id, send, &trigger) {
            self.remove_artifacts(task_id);
            return Err(SchedulerError::TriggerRegistration(format!(
                "failed to write trigger files for task {}: {}",
                task_id, err
            )));
        }

        let command = artifacts::trigger_command(&trigger.wrapper_path);
        if let Err(err) = self.os.create_one_shot(&name, &command, run_at) {
            self.remove_artifacts(task_id);
            let detail = match err {
                SchedulerError::TriggerRegistration(detail) => detail,
                other => other.to_string(),
            };
            warn!("trigger {} registration failed: {}", name, detail);
            return Err(SchedulerError::TriggerRegistration(detail));
        }

        info!("trigger {} set for {}", name, run_at);
        Ok(trigger)
    }

    /// Best-effort removal of the trigger and its files. A missing trigger is
    /// not an error, and an OS failure is logged rather than returned.
    /// Returns whether an OS trigger was actually removed.
    pub fn unregister_trigger(&self, task_id: i64) -> Result<bool, SchedulerError> {
        let name = trigger_name(task_id);
        let removed = match self.os.delete(&name) {
            Ok(removed) => removed,
            Err(err) => {
                warn!("could not remove trigger {}: {}", name, err);
                false
            }
        };
        self.remove_artifacts(task_id);
        if removed {
            info!("trigger {} removed", name);
        }
        Ok(removed)
    }

    pub fn is_registered(&self, task_id: i64) -> Result<bool, SchedulerError> {
        self.os.exists(&trigger_name(task_id))
    }

    fn write_artifacts(
        &self,
        task_id: i64,
        send: &Instruction,
        trigger: &RegisteredTrigger,
    ) -> Result<(), SchedulerError> {
        fs::create_dir_all(&self.layout.tasks_dir)?;
        let mut instruction = send.clone();
        instruction.task_id = Some(task_id);
        instruction.write(&trigger.instruction_path)?;
        fs::write(
            &trigger.launcher_path,
            artifacts::launcher_script(
                &self.layout.base_dir,
                &self.layout.executor_path,
                &trigger.instruction_path,
            ),
        )?;
        fs::write(
            &trigger.wrapper_path,
            artifacts::silent_wrapper_script(&trigger.launcher_path),
        )?;
        Ok(())
    }

    fn remove_artifacts(&self, task_id: i64) {
        let instruction = self.instruction_path(task_id);
        for path in [
            self.launcher_path(task_id),
            self.wrapper_path(task_id),
            sidecar_path(&instruction),
            instruction,
        ] {
            remove_if_exists(&path);
        }
    }
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("failed to remove {}: {}", path.display(), err),
    }
}
