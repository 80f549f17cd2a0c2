use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::{SchedulerError, TaskStore};
use crate::trigger::{SchtasksScheduler, TriggerLayout, DEFAULT_DATE_FORMAT};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STORE_BUSY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OS_CALL_TIMEOUT_SECS: u64 = 60;

#[cfg(windows)]
const EXECUTOR_FILE_NAME: &str = "run_task.exe";
#[cfg(not(windows))]
const EXECUTOR_FILE_NAME: &str = "run_task";

/// Paths and timings shared by the controller and the executor. Both
/// processes resolve the same values so they agree on the database and the
/// task directory.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_dir: PathBuf,
    pub db_path: PathBuf,
    pub tasks_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub executor_path: PathBuf,
    pub log_dir: PathBuf,
    pub store_busy_timeout: Duration,
    pub poll_interval: Duration,
    pub schtasks_date_format: String,
    pub os_call_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, SchedulerError> {
        dotenvy::dotenv().ok();

        let base_dir = match env_var_non_empty("AUTOMESSAGE_BASE_DIR") {
            Some(raw) => resolve_path(raw)?,
            None => default_base_dir()?,
        };
        let mut config = Self::from_base_dir(base_dir);

        if let Some(raw) = env_var_non_empty("AUTOMESSAGE_DB_PATH") {
            config.db_path = resolve_path(raw)?;
        }
        if let Some(raw) = env_var_non_empty("AUTOMESSAGE_TASKS_DIR") {
            config.tasks_dir = resolve_path(raw)?;
        }
        if let Some(raw) = env_var_non_empty("AUTOMESSAGE_PROFILES_DIR") {
            config.profiles_dir = resolve_path(raw)?;
        }
        if let Some(raw) = env_var_non_empty("AUTOMESSAGE_EXECUTOR_PATH") {
            config.executor_path = resolve_path(raw)?;
        }
        if let Some(secs) = env_secs("AUTOMESSAGE_STORE_BUSY_TIMEOUT_SECS") {
            config.store_busy_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("AUTOMESSAGE_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(format) = env_var_non_empty("AUTOMESSAGE_SCHTASKS_DATE_FORMAT") {
            config.schtasks_date_format = format;
        }
        if let Some(secs) = env_secs("AUTOMESSAGE_OS_CALL_TIMEOUT_SECS") {
            config.os_call_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Defaults laid out under one application directory.
    pub fn from_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            db_path: base_dir.join("user_data").join("scheduler.db"),
            tasks_dir: base_dir.join("scheduled_tasks"),
            profiles_dir: base_dir.join("profiles"),
            executor_path: base_dir.join(EXECUTOR_FILE_NAME),
            log_dir: base_dir.join("logs"),
            store_busy_timeout: Duration::from_secs(DEFAULT_STORE_BUSY_TIMEOUT_SECS),
            poll_interval: DEFAULT_POLL_INTERVAL,
            schtasks_date_format: DEFAULT_DATE_FORMAT.to_string(),
            os_call_timeout: Duration::from_secs(DEFAULT_OS_CALL_TIMEOUT_SECS),
            base_dir,
        }
    }

    /// Same settings with the database and task files moved under
    /// `scratch`. Dry runs use it so nothing they write survives them.
    pub fn with_scratch_dir(&self, scratch: &Path) -> Self {
        Self {
            db_path: scratch.join("user_data").join("scheduler.db"),
            tasks_dir: scratch.join("scheduled_tasks"),
            ..self.clone()
        }
    }

    pub fn open_store(&self) -> Result<TaskStore, SchedulerError> {
        TaskStore::with_busy_timeout(&self.db_path, self.store_busy_timeout)
    }

    pub fn trigger_layout(&self) -> TriggerLayout {
        TriggerLayout {
            base_dir: self.base_dir.clone(),
            tasks_dir: self.tasks_dir.clone(),
            executor_path: self.executor_path.clone(),
        }
    }

    pub fn schtasks(&self) -> SchtasksScheduler {
        SchtasksScheduler::new(self.schtasks_date_format.clone(), self.os_call_timeout)
    }

    pub fn profile_dir(&self, context: ExecutionContext) -> PathBuf {
        self.profiles_dir.join(context.profile_name())
    }
}

/// Each context gets its own browser profile so an immediate send and a
/// scheduled one never fight over the same profile lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    Interactive,
    Scheduled,
}

impl ExecutionContext {
    pub fn for_task_id(task_id: Option<i64>) -> Self {
        match task_id {
            Some(_) => ExecutionContext::Scheduled,
            None => ExecutionContext::Interactive,
        }
    }

    pub fn profile_name(&self) -> &'static str {
        match self {
            ExecutionContext::Interactive => "interactive",
            ExecutionContext::Scheduled => "scheduled",
        }
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_secs(key: &str) -> Option<u64> {
    env_var_non_empty(key)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
}

fn default_base_dir() -> Result<PathBuf, io::Error> {
    let exe = env::current_exe()?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn resolve_path(raw: String) -> Result<PathBuf, io::Error> {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir()?;
        Ok(cwd.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: String,
        previous: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let previous = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                previous,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => env::set_var(&self.key, value),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn base_dir_defaults_lay_out_every_path() {
        let config = AppConfig::from_base_dir("/opt/automessage");
        assert_eq!(
            config.db_path,
            PathBuf::from("/opt/automessage/user_data/scheduler.db")
        );
        assert_eq!(config.tasks_dir, PathBuf::from("/opt/automessage/scheduled_tasks"));
        assert_eq!(
            config.profile_dir(ExecutionContext::Scheduled),
            PathBuf::from("/opt/automessage/profiles/scheduled")
        );
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.store_busy_timeout, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn env_overrides_paths_and_timings() {
        let _base = EnvGuard::set("AUTOMESSAGE_BASE_DIR", "/srv/am");
        let _db = EnvGuard::set("AUTOMESSAGE_DB_PATH", "/data/tasks.db");
        let _poll = EnvGuard::set("AUTOMESSAGE_POLL_INTERVAL_SECS", "2");
        let _busy = EnvGuard::set("AUTOMESSAGE_STORE_BUSY_TIMEOUT_SECS", "0");
        let _fmt = EnvGuard::set("AUTOMESSAGE_SCHTASKS_DATE_FORMAT", "%m/%d/%Y");

        let config = AppConfig::from_env().expect("config");
        assert_eq!(config.base_dir, PathBuf::from("/srv/am"));
        assert_eq!(config.db_path, PathBuf::from("/data/tasks.db"));
        assert_eq!(config.tasks_dir, PathBuf::from("/srv/am/scheduled_tasks"));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.store_busy_timeout, Duration::from_secs(30));
        assert_eq!(config.schtasks_date_format, "%m/%d/%Y");
    }

    #[test]
    fn scratch_dir_moves_only_store_and_task_files() {
        let config = AppConfig::from_base_dir("/opt/automessage");
        let scratch = config.with_scratch_dir(Path::new("/tmp/dry"));
        assert_eq!(scratch.db_path, PathBuf::from("/tmp/dry/user_data/scheduler.db"));
        assert_eq!(scratch.tasks_dir, PathBuf::from("/tmp/dry/scheduled_tasks"));
        assert_eq!(scratch.executor_path, config.executor_path);
        assert_eq!(scratch.base_dir, config.base_dir);
    }

    #[test]
    fn context_follows_task_id() {
        assert_eq!(
            ExecutionContext::for_task_id(Some(3)),
            ExecutionContext::Scheduled
        );
        assert_eq!(
            ExecutionContext::for_task_id(None),
            ExecutionContext::Interactive
        );
    }
}
