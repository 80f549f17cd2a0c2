use chrono::NaiveDateTime;
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

use super::command::{combined_output, run_command_with_timeout};
use super::OsScheduler;
use crate::scheduler::SchedulerError;

pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";
pub const DEFAULT_OS_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Windows Task Scheduler through `schtasks.exe`.
///
/// `/sd` is parsed with the machine's short date format, so the format is
/// configurable; the default matches dd/mm/yyyy locales.
#[derive(Debug, Clone)]
pub struct SchtasksScheduler {
    program: String,
    date_format: String,
    timeout: Duration,
}

impl Default for SchtasksScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT, DEFAULT_OS_CALL_TIMEOUT)
    }
}

impl SchtasksScheduler {
    pub fn new(date_format: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: "schtasks".to_string(),
            date_format: date_format.into(),
            timeout,
        }
    }

    pub(crate) fn create_args(&self, name: &str, command: &str, run_at: NaiveDateTime) -> Vec<String> {
        vec![
            "/create".to_string(),
            "/tn".to_string(),
            name.to_string(),
            "/tr".to_string(),
            command.to_string(),
            "/sc".to_string(),
            "once".to_string(),
            "/st".to_string(),
            run_at.format("%H:%M").to_string(),
            "/sd".to_string(),
            run_at.format(&self.date_format).to_string(),
            "/f".to_string(),
        ]
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd
    }
}

impl OsScheduler for SchtasksScheduler {
    fn create_one_shot(
        &self,
        name: &str,
        command: &str,
        run_at: NaiveDateTime,
    ) -> Result<(), SchedulerError> {
        let args = self.create_args(name, command, run_at);
        let output = run_command_with_timeout(
            self.command(&args),
            self.timeout,
            "schtasks /create",
            SchedulerError::TriggerRegistration,
        )
        .map_err(|err| match err {
            SchedulerError::Io(io) => {
                SchedulerError::TriggerRegistration(format!("failed to run schtasks: {}", io))
            }
            other => other,
        })?;
        if !output.status.success() {
            return Err(SchedulerError::TriggerRegistration(combined_output(&output)));
        }
        info!("registered trigger {} for {}", name, run_at);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, SchedulerError> {
        if !self.exists(name)? {
            return Ok(false);
        }
        let args = vec![
            "/delete".to_string(),
            "/tn".to_string(),
            name.to_string(),
            "/f".to_string(),
        ];
        let output = run_command_with_timeout(
            self.command(&args),
            self.timeout,
            "schtasks /delete",
            SchedulerError::TriggerRemoval,
        )?;
        if !output.status.success() {
            let detail = combined_output(&output);
            warn!("schtasks /delete {} failed: {}", name, detail);
            return Err(SchedulerError::TriggerRemoval(detail));
        }
        Ok(true)
    }

    fn exists(&self, name: &str) -> Result<bool, SchedulerError> {
        let args = vec!["/query".to_string(), "/tn".to_string(), name.to_string()];
        let output = run_command_with_timeout(
            self.command(&args),
            self.timeout,
            "schtasks /query",
            SchedulerError::TriggerRemoval,
        )?;
        Ok(output.status.success())
    }
}
