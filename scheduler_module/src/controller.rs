//! Interactive-side orchestration: schedule, edit, delete and immediate
//! sends. Anything that calls out to the OS scheduler or spawns the
//! executor runs on a worker thread; results come back as
//! `ControllerEvent`s so a display loop never blocks on them.

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::instruction::{take_sidecar, Instruction};
use crate::scheduler::{
    absolutize, validate_content, SchedulerError, SendMode, StatusCounts, Task, TaskDraft,
    TaskRef, TaskStatus, TaskStore,
};
use crate::trigger::{
    run_command_with_timeout, tail_string, OsScheduler, RegisteredTrigger, TriggerManager,
};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(600);

/// Content for an immediate send.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub target: String,
    pub mode: SendMode,
    pub message: Option<String>,
    pub attachments: Vec<PathBuf>,
}

impl SendRequest {
    pub fn from_draft(draft: &TaskDraft) -> Self {
        Self {
            target: draft.target.clone(),
            mode: draft.mode,
            message: draft.message.clone(),
            attachments: draft.attachments.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Failed {
        exit_code: Option<i32>,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Scheduled {
        task_id: i64,
        trigger: RegisteredTrigger,
    },
    /// Registration failed and the row was removed again.
    ScheduleFailed { task_id: i64, error: String },
    Rescheduled {
        task_id: i64,
        trigger: RegisteredTrigger,
    },
    EditFailed { task_id: i64, error: String },
    SendNowFinished {
        instruction_path: PathBuf,
        outcome: SendOutcome,
    },
}

/// Handle on background work started by the controller.
#[derive(Debug)]
pub struct BackgroundJob<T> {
    pub task_id: Option<i64>,
    handle: JoinHandle<T>,
}

impl<T> BackgroundJob<T> {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn wait(self) -> Result<T, SchedulerError> {
        self.handle
            .join()
            .map_err(|_| SchedulerError::Executor("background worker panicked".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub tasks: Vec<Task>,
    pub counts: StatusCounts,
    pub taken_at: DateTime<Utc>,
}

impl TaskSnapshot {
    /// Pending rows whose time already passed; their trigger never fired.
    pub fn overdue(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Pending && task.scheduled_time < self.taken_at)
            .collect()
    }
}

pub struct Controller<S> {
    store: TaskStore,
    triggers: Arc<TriggerManager<S>>,
    events: Sender<ControllerEvent>,
    send_timeout: Duration,
}

impl<S: OsScheduler + 'static> Controller<S> {
    pub fn new(store: TaskStore, triggers: TriggerManager<S>) -> (Self, Receiver<ControllerEvent>) {
        let (events, receiver) = unbounded();
        (
            Self {
                store,
                triggers: Arc::new(triggers),
                events,
                send_timeout: DEFAULT_SEND_TIMEOUT,
            },
            receiver,
        )
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn triggers(&self) -> &TriggerManager<S> {
        &self.triggers
    }

    /// Adds a pending row under a generated name and registers its trigger
    /// in the background. If registration fails the row is deleted so no
    /// task is left without a trigger.
    pub fn schedule_task(
        &self,
        draft: &TaskDraft,
    ) -> Result<BackgroundJob<Result<RegisteredTrigger, SchedulerError>>, SchedulerError> {
        let name = format!("task_{}", Uuid::new_v4().simple());
        let id = self.store.add_task(&name, draft)?;
        let task = self
            .store
            .get_by_id(id)?
            .ok_or(SchedulerError::NotFound(TaskRef::Id(id)))?;

        let store = self.store.clone();
        let triggers = Arc::clone(&self.triggers);
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name(format!("register-{}", id))
            .spawn(move || {
                let instruction = Instruction::from_task(&task);
                match triggers.register_trigger(id, &instruction, task.scheduled_time) {
                    Ok(trigger) => {
                        let _ = events.send(ControllerEvent::Scheduled {
                            task_id: id,
                            trigger: trigger.clone(),
                        });
                        Ok(trigger)
                    }
                    Err(err) => {
                        error!("task {} registration failed, removing row: {}", id, err);
                        if let Err(delete_err) = store.delete(id) {
                            error!("rollback of task {} failed: {}", id, delete_err);
                        }
                        let _ = events.send(ControllerEvent::ScheduleFailed {
                            task_id: id,
                            error: err.to_string(),
                        });
                        Err(err)
                    }
                }
            })?;
        Ok(BackgroundJob {
            task_id: Some(id),
            handle,
        })
    }

    /// Rewrites a non-running task, resets it to pending and replaces its
    /// trigger. A task whose new trigger cannot be registered is deleted.
    pub fn edit_task(
        &self,
        id: i64,
        draft: &TaskDraft,
    ) -> Result<BackgroundJob<Result<RegisteredTrigger, SchedulerError>>, SchedulerError> {
        let task = self.store.update_full(id, draft)?;

        let store = self.store.clone();
        let triggers = Arc::clone(&self.triggers);
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name(format!("reregister-{}", id))
            .spawn(move || {
                triggers.unregister_trigger(id)?;
                let instruction = Instruction::from_task(&task);
                match triggers.register_trigger(id, &instruction, task.scheduled_time) {
                    Ok(trigger) => {
                        let _ = events.send(ControllerEvent::Rescheduled {
                            task_id: id,
                            trigger: trigger.clone(),
                        });
                        Ok(trigger)
                    }
                    Err(err) => {
                        error!("task {} re-registration failed, removing row: {}", id, err);
                        if let Err(delete_err) = store.delete(id) {
                            error!("rollback of task {} failed: {}", id, delete_err);
                        }
                        let _ = events.send(ControllerEvent::EditFailed {
                            task_id: id,
                            error: err.to_string(),
                        });
                        Err(err)
                    }
                }
            })?;
        Ok(BackgroundJob {
            task_id: Some(id),
            handle,
        })
    }

    /// Hard delete. Running tasks are refused; a pending task loses its
    /// trigger first so it can no longer fire.
    pub fn delete_task(&self, id: i64) -> Result<bool, SchedulerError> {
        match self.store.get_by_id(id)? {
            Some(task) if task.status == TaskStatus::Running => {
                Err(SchedulerError::TaskRunning(id))
            }
            Some(_) => {
                self.triggers.unregister_trigger(id)?;
                self.store.delete(id)
            }
            None => {
                self.triggers.unregister_trigger(id)?;
                Ok(false)
            }
        }
    }

    /// Marks a pending task cancelled and drops its trigger; the row stays.
    pub fn cancel_task(&self, id: i64) -> Result<Task, SchedulerError> {
        let task = self.store.cancel(id)?;
        self.triggers.unregister_trigger(id)?;
        Ok(task)
    }

    /// Runs the executor right away on an ephemeral instruction. No row is
    /// written; the outcome comes from the exit code and the sidecar.
    pub fn send_now(
        &self,
        request: &SendRequest,
    ) -> Result<BackgroundJob<SendOutcome>, SchedulerError> {
        validate_content(
            &request.target,
            request.mode,
            request.message.as_deref(),
            &request.attachments,
        )?;
        let attachments = absolutize(&request.attachments)?;
        let instruction = Instruction::ephemeral(
            request.target.trim(),
            request.mode,
            request.message.clone(),
            &attachments,
        );
        let layout = self.triggers.layout().clone();
        fs::create_dir_all(&layout.tasks_dir)?;
        let instruction_path = layout
            .tasks_dir
            .join(format!("now_{}.json", Uuid::new_v4().simple()));
        instruction.write(&instruction_path)?;

        let events = self.events.clone();
        let timeout = self.send_timeout;
        let handle = thread::Builder::new()
            .name("send-now".to_string())
            .spawn(move || {
                let mut cmd = Command::new(&layout.executor_path);
                cmd.arg(&instruction_path).current_dir(&layout.base_dir);
                let outcome = match run_command_with_timeout(
                    cmd,
                    timeout,
                    "run_task",
                    SchedulerError::Executor,
                ) {
                    Ok(output) if output.status.success() => SendOutcome::Sent,
                    Ok(output) => {
                        let sidecar = take_sidecar(&instruction_path).unwrap_or_else(|err| {
                            warn!("could not read sidecar for {}: {}", instruction_path.display(), err);
                            None
                        });
                        let reason = sidecar.unwrap_or_else(|| {
                            let stderr = String::from_utf8_lossy(&output.stderr);
                            format!("executor exited with {}: {}", output.status, tail_string(&stderr, 500))
                        });
                        SendOutcome::Failed {
                            exit_code: output.status.code(),
                            reason,
                        }
                    }
                    Err(err) => SendOutcome::Failed {
                        exit_code: None,
                        reason: err.to_string(),
                    },
                };
                if let Err(err) = fs::remove_file(&instruction_path) {
                    warn!("failed to remove {}: {}", instruction_path.display(), err);
                }
                match &outcome {
                    SendOutcome::Sent => info!("immediate send to {} finished", instruction.target),
                    SendOutcome::Failed { reason, .. } => {
                        error!("immediate send to {} failed: {}", instruction.target, reason)
                    }
                }
                let _ = events.send(ControllerEvent::SendNowFinished {
                    instruction_path,
                    outcome: outcome.clone(),
                });
                outcome
            })?;
        Ok(BackgroundJob {
            task_id: None,
            handle,
        })
    }

    pub fn refresh(&self) -> Result<TaskSnapshot, SchedulerError> {
        let tasks = self.store.list_all()?;
        let counts = self.store.count_by_status()?;
        Ok(TaskSnapshot {
            tasks,
            counts,
            taken_at: Utc::now(),
        })
    }

    /// Polls the store until `stop_flag` is set, handing each snapshot (or
    /// the error that prevented it) to `sink`.
    pub fn run_refresh_loop<F>(&self, poll_interval: Duration, stop_flag: &AtomicBool, mut sink: F)
    where
        F: FnMut(Result<TaskSnapshot, SchedulerError>),
    {
        while !stop_flag.load(Ordering::Relaxed) {
            sink(self.refresh());
            thread::sleep(poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{MemoryOsScheduler, TriggerLayout};
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn controller(temp: &TempDir) -> (Controller<MemoryOsScheduler>, Receiver<ControllerEvent>) {
        let store = TaskStore::new(temp.path().join("scheduler.db")).expect("store");
        let layout = TriggerLayout {
            base_dir: temp.path().to_path_buf(),
            tasks_dir: temp.path().join("scheduled_tasks"),
            executor_path: temp.path().join("run_task"),
        };
        Controller::new(store, TriggerManager::new(layout, MemoryOsScheduler::new()))
    }

    fn draft() -> TaskDraft {
        TaskDraft::new("5511999999999", SendMode::Text, Utc::now() + ChronoDuration::minutes(2))
            .with_message("hi")
    }

    #[test]
    fn snapshot_flags_overdue_pending_rows() {
        let now = Utc::now();
        let task = |id: i64, status: TaskStatus, minutes: i64| Task {
            id,
            name: format!("t{}", id),
            target: "55".to_string(),
            mode: SendMode::Text,
            message: Some("hi".to_string()),
            attachments: Vec::new(),
            scheduled_time: now + ChronoDuration::minutes(minutes),
            created_at: now,
            status,
            executed_at: None,
            attempts: 0,
            error_message: None,
        };
        let snapshot = TaskSnapshot {
            tasks: vec![
                task(1, TaskStatus::Pending, -5),
                task(2, TaskStatus::Pending, 5),
                task(3, TaskStatus::Completed, -5),
            ],
            counts: StatusCounts::default(),
            taken_at: now,
        };
        let overdue: Vec<i64> = snapshot.overdue().iter().map(|task| task.id).collect();
        assert_eq!(overdue, vec![1]);
    }

    #[test]
    fn refresh_loop_stops_on_flag() {
        let temp = TempDir::new().expect("tempdir");
        let (controller, _events) = controller(&temp);
        controller.schedule_task(&draft()).expect("schedule").wait().expect("join").expect("registered");

        let stop = AtomicBool::new(false);
        let mut seen = Vec::new();
        controller.run_refresh_loop(Duration::from_millis(1), &stop, |snapshot| {
            seen.push(snapshot.expect("snapshot").counts.pending);
            if seen.len() == 2 {
                stop.store(true, Ordering::Relaxed);
            }
        });
        assert_eq!(seen, vec![1, 1]);
    }

    #[test]
    fn send_now_rejects_invalid_content_before_spawning() {
        let temp = TempDir::new().expect("tempdir");
        let (controller, _events) = controller(&temp);
        let request = SendRequest {
            target: "55".to_string(),
            mode: SendMode::File,
            message: None,
            attachments: Vec::new(),
        };
        assert!(matches!(
            controller.send_now(&request),
            Err(SchedulerError::Validation(_))
        ));
    }

    #[test]
    fn send_now_reports_missing_executor() {
        let temp = TempDir::new().expect("tempdir");
        let (controller, events) = controller(&temp);
        let request = SendRequest::from_draft(&draft());
        let outcome = controller
            .send_now(&request)
            .expect("spawn")
            .wait()
            .expect("join");
        assert!(matches!(outcome, SendOutcome::Failed { exit_code: None, .. }));
        match events.recv().expect("event") {
            ControllerEvent::SendNowFinished {
                instruction_path, ..
            } => assert!(!instruction_path.exists()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[cfg(unix)]
    fn install_executor(temp: &TempDir, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = temp.path().join("run_task");
        fs::write(&path, format!("#!/bin/sh\n{}\n", script)).expect("write executor");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    #[cfg(unix)]
    #[test]
    fn chatty_executor_that_exits_zero_is_sent() {
        let temp = TempDir::new().expect("tempdir");
        install_executor(&temp, "head -c 200000 /dev/zero | tr '\\0' x >&2\nexit 0");
        let (controller, _events) = controller(&temp);
        let controller = controller.with_send_timeout(Duration::from_secs(5));
        let outcome = controller
            .send_now(&SendRequest::from_draft(&draft()))
            .expect("spawn")
            .wait()
            .expect("join");
        assert_eq!(outcome, SendOutcome::Sent);
    }

    #[cfg(unix)]
    #[test]
    fn failed_executor_reason_comes_from_sidecar() {
        let temp = TempDir::new().expect("tempdir");
        install_executor(
            &temp,
            "echo 'FAILED: element not found: send_button' > \"${1%.json}.status\"\nexit 1",
        );
        let (controller, _events) = controller(&temp);
        let outcome = controller
            .send_now(&SendRequest::from_draft(&draft()))
            .expect("spawn")
            .wait()
            .expect("join");
        assert_eq!(
            outcome,
            SendOutcome::Failed {
                exit_code: Some(1),
                reason: "element not found: send_button".to_string(),
            }
        );
        let leftovers: Vec<_> = fs::read_dir(temp.path().join("scheduled_tasks"))
            .expect("tasks dir")
            .collect();
        assert!(leftovers.is_empty());
    }
}
