use scheduler_module::instruction::write_sidecar;
use scheduler_module::{
    ExecutionContext, Instruction, SchedulerError, SendMode, TaskStatus, TaskStore,
};
use send_message_module::{
    send_with_fresh_session, ActionExecutor, SendContent, SessionLauncher, SessionOptions,
};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::constants::EXIT_SUCCESS;
use super::errors::RunTaskError;

/// Everything one executor process needs. The store is optional so an
/// immediate send still runs when the database cannot be opened.
pub struct BrokerContext<L: SessionLauncher> {
    pub store: Option<TaskStore>,
    pub launcher: L,
    pub executor: ActionExecutor,
    pub profiles_dir: PathBuf,
    pub remote_url: String,
    pub session_options: SessionOptions,
}

impl<L: SessionLauncher> BrokerContext<L> {
    /// Runs one instruction and maps the outcome to the process exit code.
    pub fn entry(&self, instruction_path: &Path) -> i32 {
        match self.run(instruction_path) {
            Ok(()) => EXIT_SUCCESS,
            Err(err) => {
                error!("run_task {} failed: {}", instruction_path.display(), err);
                err.exit_code()
            }
        }
    }

    pub fn run(&self, instruction_path: &Path) -> Result<(), RunTaskError> {
        let instruction = load_instruction(instruction_path)?;
        let task_id = instruction.task_id;
        info!(
            "executing {} (task {:?}, mode {}, target {})",
            instruction_path.display(),
            task_id,
            instruction.mode,
            instruction.target
        );

        let reporter = self.reporter();
        if let Some(id) = task_id {
            if let Err(err) = reporter.claim(id) {
                if matches!(err, RunTaskError::TaskNotRunnable { .. }) {
                    warn!("{}", err);
                } else {
                    reporter.write_failure_sidecar(instruction_path, &err.to_string());
                }
                return Err(err);
            }
        }

        let context = ExecutionContext::for_task_id(task_id);
        let profile_dir = self.profiles_dir.join(context.profile_name());
        let options = SessionOptions {
            offscreen: context == ExecutionContext::Scheduled,
            ..self.session_options.clone()
        };
        let content = send_content(&instruction);

        match send_with_fresh_session(
            &self.launcher,
            &profile_dir,
            &options,
            &self.remote_url,
            &self.executor,
            &instruction.target,
            &content,
        ) {
            Ok(()) => {
                reporter.report_success(task_id);
                Ok(())
            }
            Err(err) => {
                let detail = err.to_string();
                error!("send to {} failed: {:?}", instruction.target, err);
                reporter.report_failure(task_id, instruction_path, &detail);
                Err(RunTaskError::Send(err))
            }
        }
    }

    fn reporter(&self) -> Reporter<'_> {
        Reporter {
            store: self.store.as_ref(),
        }
    }
}

/// Records a failure that happened before a session could be started,
/// such as a broken selector catalog. The task is claimed and marked
/// failed like any other attempt so it never sits pending unnoticed.
/// Returns the exit code for the process.
pub fn report_setup_failure(
    store: Option<&TaskStore>,
    instruction_path: &Path,
    err: RunTaskError,
) -> i32 {
    error!("run_task {} cannot start: {}", instruction_path.display(), err);
    let instruction = match load_instruction(instruction_path) {
        Ok(instruction) => instruction,
        Err(load_err) => {
            error!("{}", load_err);
            return load_err.exit_code();
        }
    };
    let reporter = Reporter { store };
    let detail = err.to_string();
    if let Some(id) = instruction.task_id {
        if let Err(claim_err) = reporter.claim(id) {
            if matches!(claim_err, RunTaskError::TaskNotRunnable { .. }) {
                warn!("{}", claim_err);
                return claim_err.exit_code();
            }
            reporter.write_failure_sidecar(instruction_path, &detail);
            return err.exit_code();
        }
    }
    reporter.report_failure(instruction.task_id, instruction_path, &detail);
    err.exit_code()
}

struct Reporter<'a> {
    store: Option<&'a TaskStore>,
}

impl Reporter<'_> {
    fn store_for(&self, task_id: i64) -> Result<&TaskStore, RunTaskError> {
        self.store.ok_or(RunTaskError::StoreUnavailable { task_id })
    }

    /// Moves the task to running. Only a pending task is executed; a
    /// deleted, cancelled or already finished one is left alone.
    fn claim(&self, task_id: i64) -> Result<(), RunTaskError> {
        let store = self.store_for(task_id)?;
        let current = store.get_by_id(task_id)?;
        match current.map(|task| task.status) {
            Some(TaskStatus::Pending) => {}
            status => return Err(RunTaskError::TaskNotRunnable { task_id, status }),
        }
        match store.update_status(task_id, TaskStatus::Running, None) {
            Ok(task) => {
                info!("task {} running (attempt {})", task_id, task.attempts);
                Ok(())
            }
            Err(SchedulerError::NotFound(_)) => Err(RunTaskError::TaskNotRunnable {
                task_id,
                status: None,
            }),
            Err(SchedulerError::InvalidTransition { from, .. }) => {
                Err(RunTaskError::TaskNotRunnable {
                    task_id,
                    status: Some(from),
                })
            }
            Err(err) => Err(RunTaskError::Store(err)),
        }
    }

    /// The message is already out, so a store failure here is only logged.
    fn report_success(&self, task_id: Option<i64>) {
        let Some(id) = task_id else {
            info!("immediate send completed");
            return;
        };
        let result = self
            .store_for(id)
            .and_then(|store| Ok(store.update_status(id, TaskStatus::Completed, None)?));
        match result {
            Ok(_) => info!("task {} completed", id),
            Err(err) => error!("task {} sent but not marked completed: {}", id, err),
        }
    }

    fn report_failure(&self, task_id: Option<i64>, instruction_path: &Path, detail: &str) {
        let Some(id) = task_id else {
            self.write_failure_sidecar(instruction_path, detail);
            return;
        };
        let result = self
            .store_for(id)
            .and_then(|store| Ok(store.update_status(id, TaskStatus::Failed, Some(detail))?));
        match result {
            Ok(_) => info!("task {} marked failed", id),
            Err(err) => {
                error!("task {} failure not recorded in store: {}", id, err);
                self.write_failure_sidecar(instruction_path, detail);
            }
        }
    }

    fn write_failure_sidecar(&self, instruction_path: &Path, detail: &str) {
        match write_sidecar(instruction_path, detail) {
            Ok(path) => info!("failure written to {}", path.display()),
            Err(err) => error!(
                "cannot write failure sidecar for {}: {}",
                instruction_path.display(),
                err
            ),
        }
    }
}

fn load_instruction(path: &Path) -> Result<Instruction, RunTaskError> {
    if !path.is_file() {
        return Err(RunTaskError::InstructionMissing {
            path: path.to_path_buf(),
        });
    }
    let instruction = Instruction::read(path).map_err(|err| RunTaskError::InvalidInstruction {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    instruction
        .validate()
        .map_err(|err| RunTaskError::InvalidInstruction {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    Ok(instruction)
}

/// `file_text` sends the message as the caption of the attachments.
fn send_content(instruction: &Instruction) -> SendContent {
    match instruction.mode {
        SendMode::Text => SendContent::Text(instruction.message().unwrap_or_default().to_string()),
        SendMode::File => SendContent::Files {
            attachments: instruction.attachments(),
            caption: None,
        },
        SendMode::FileText => SendContent::Files {
            attachments: instruction.attachments(),
            caption: instruction.message().map(str::to_string),
        },
    }
}
