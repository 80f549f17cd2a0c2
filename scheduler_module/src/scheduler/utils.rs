use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};

use super::types::SchedulerError;

/// Fixed-width RFC 3339 so that lexical order in SQLite matches time order.
pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, SchedulerError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

pub(crate) fn parse_optional_datetime(
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, SchedulerError> {
    match value {
        Some(raw) => Ok(Some(parse_datetime(raw)?)),
        None => Ok(None),
    }
}

pub(crate) fn join_attachments(values: &[PathBuf]) -> Option<String> {
    let joined = values
        .iter()
        .map(|path| path.to_string_lossy().trim().to_string())
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

pub(crate) fn split_attachments(raw: &str) -> Vec<PathBuf> {
    raw.lines()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub(crate) fn normalize_message(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(|trimmed| trimmed.to_string())
}

/// Absolute form of each attachment path, relative ones resolved against
/// the current directory. Existence is checked at send time, not here.
pub(crate) fn absolutize(paths: &[PathBuf]) -> Result<Vec<PathBuf>, SchedulerError> {
    let cwd = std::env::current_dir()?;
    Ok(paths
        .iter()
        .filter(|path| !path.as_os_str().is_empty())
        .map(|path| absolutize_one(&cwd, path))
        .collect())
}

fn absolutize_one(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
