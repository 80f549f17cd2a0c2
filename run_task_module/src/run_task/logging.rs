//! The executor runs hidden under the OS scheduler, so its output also goes
//! to a per-execution log file: `<log_dir>/<YYYY-MM-DD>/<instruction-stem>.log`.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::constants::LOG_DIR_DATE_FORMAT;

pub fn execution_log_path(log_dir: &Path, instruction_path: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = instruction_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "run_task".to_string());
    log_dir
        .join(now.format(LOG_DIR_DATE_FORMAT).to_string())
        .join(format!("{}.log", stem))
}

#[derive(Clone)]
struct ExecutionLog {
    file: Arc<Mutex<File>>,
}

struct ExecutionLogWriter {
    file: Arc<Mutex<File>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for ExecutionLog {
    type Writer = ExecutionLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ExecutionLogWriter {
            file: Arc::clone(&self.file),
        }
    }
}

/// Tees every line to stderr and the log file.
impl Write for ExecutionLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        guard.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        guard.flush()
    }
}

/// Installs the global subscriber. Falls back to stderr only when the log
/// file cannot be created; returns the file path when it could.
pub fn init_execution_logging(log_dir: &Path, instruction_path: &Path) -> Option<PathBuf> {
    let path = execution_log_path(log_dir, instruction_path, Local::now());
    let opened = path
        .parent()
        .map(fs::create_dir_all)
        .unwrap_or(Ok(()))
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
    match opened {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_ansi(false)
                .with_writer(ExecutionLog {
                    file: Arc::new(Mutex::new(file)),
                })
                .init();
            Some(path)
        }
        Err(err) => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_writer(io::stderr)
                .init();
            tracing::warn!("execution log {} unavailable: {}", path.display(), err);
            None
        }
    }
}
