use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::OsScheduler;
use crate::scheduler::SchedulerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub command: String,
    pub run_at: NaiveDateTime,
}

/// Process-local stand-in for the OS scheduler. Used by tests and by
/// `automessage --dry-run` on machines without Task Scheduler.
#[derive(Debug, Default)]
pub struct MemoryOsScheduler {
    registrations: Mutex<HashMap<String, Registration>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryOsScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create_one_shot` fail with `detail`.
    pub fn fail_next_with(&self, detail: impl Into<String>) {
        *lock(&self.fail_next) = Some(detail.into());
    }

    pub fn registration(&self, name: &str) -> Option<Registration> {
        lock(&self.registrations).get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.registrations).keys().cloned().collect();
        names.sort();
        names
    }
}

impl OsScheduler for MemoryOsScheduler {
    fn create_one_shot(
        &self,
        name: &str,
        command: &str,
        run_at: NaiveDateTime,
    ) -> Result<(), SchedulerError> {
        if let Some(detail) = lock(&self.fail_next).take() {
            return Err(SchedulerError::TriggerRegistration(detail));
        }
        lock(&self.registrations).insert(
            name.to_string(),
            Registration {
                command: command.to_string(),
                run_at,
            },
        );
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, SchedulerError> {
        Ok(lock(&self.registrations).remove(name).is_some())
    }

    fn exists(&self, name: &str) -> Result<bool, SchedulerError> {
        Ok(lock(&self.registrations).contains_key(name))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
