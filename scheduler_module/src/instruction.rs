//! Instruction files: the JSON handed to one executor process.
//!
//! A trigger-owned instruction lives at `<tasks_dir>/task_<id>.json` and
//! carries a `task_id`; an immediate send writes a throwaway file without
//! one. The executor reports ephemeral failures through a sidecar next to
//! the instruction (`.status` extension).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::scheduler::{
    join_attachments, split_attachments, validate_content, SchedulerError, SendMode, Task,
};

pub const SIDECAR_EXTENSION: &str = "status";
const SIDECAR_FAILURE_PREFIX: &str = "FAILED: ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub target: String,
    pub mode: SendMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Attachment paths joined by newline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_task_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub task_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Instruction {
    pub fn from_task(task: &Task) -> Self {
        Self {
            target: task.target.clone(),
            mode: task.mode,
            message: task.message.clone(),
            file_path: join_attachments(&task.attachments),
            task_id: Some(task.id),
            task_name: Some(task.name.clone()),
            created_at: Some(task.created_at),
        }
    }

    /// An immediate send with no backing row.
    pub fn ephemeral(
        target: impl Into<String>,
        mode: SendMode,
        message: Option<String>,
        attachments: &[PathBuf],
    ) -> Self {
        Self {
            target: target.into(),
            mode,
            message,
            file_path: join_attachments(attachments),
            task_id: None,
            task_name: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn attachments(&self) -> Vec<PathBuf> {
        self.file_path
            .as_deref()
            .map(split_attachments)
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        validate_content(&self.target, self.mode, self.message(), &self.attachments())
    }

    pub fn read(path: &Path) -> Result<Self, SchedulerError> {
        let raw = fs::read_to_string(path)?;
        let instruction: Instruction = serde_json::from_str(&raw)?;
        Ok(instruction)
    }

    pub fn write(&self, path: &Path) -> Result<(), SchedulerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(self)?;
        fs::write(path, payload)?;
        Ok(())
    }
}

/// Older instruction writers emitted the id as a string, sometimes empty.
fn deserialize_task_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Text(String),
    }

    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Int(value)) => Ok(Some(value)),
        Some(RawId::Text(value)) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid task_id '{}'", trimmed)))
        }
    }
}

pub fn sidecar_path(instruction_path: &Path) -> PathBuf {
    instruction_path.with_extension(SIDECAR_EXTENSION)
}

/// Writes `FAILED: <reason>` as a single line. Newlines in the reason are
/// folded so readers can rely on one line.
pub fn write_sidecar(instruction_path: &Path, reason: &str) -> Result<PathBuf, SchedulerError> {
    let path = sidecar_path(instruction_path);
    let summary = reason.split_whitespace().collect::<Vec<_>>().join(" ");
    fs::write(&path, format!("{}{}\n", SIDECAR_FAILURE_PREFIX, summary))?;
    Ok(path)
}

/// The failure reason, if a sidecar exists.
pub fn read_sidecar(instruction_path: &Path) -> Result<Option<String>, SchedulerError> {
    let path = sidecar_path(instruction_path);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)?;
    let line = raw.lines().next().unwrap_or_default().trim();
    let reason = line.strip_prefix(SIDECAR_FAILURE_PREFIX.trim_end()).unwrap_or(line);
    Ok(Some(reason.trim().to_string()))
}

/// Reads the sidecar and removes it.
pub fn take_sidecar(instruction_path: &Path) -> Result<Option<String>, SchedulerError> {
    let reason = read_sidecar(instruction_path)?;
    if reason.is_some() {
        fs::remove_file(sidecar_path(instruction_path))?;
    }
    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn task_id_accepts_numbers_strings_and_blanks() {
        let numeric: Instruction =
            serde_json::from_str(r#"{"target":"55","mode":"text","message":"hi","task_id":7}"#)
                .expect("numeric");
        assert_eq!(numeric.task_id, Some(7));

        let text: Instruction =
            serde_json::from_str(r#"{"target":"55","mode":"text","message":"hi","task_id":"8"}"#)
                .expect("text");
        assert_eq!(text.task_id, Some(8));

        let blank: Instruction =
            serde_json::from_str(r#"{"target":"55","mode":"text","message":"hi","task_id":""}"#)
                .expect("blank");
        assert_eq!(blank.task_id, None);

        let missing: Instruction =
            serde_json::from_str(r#"{"target":"55","mode":"text","message":"hi"}"#)
                .expect("missing");
        assert_eq!(missing.task_id, None);

        assert!(serde_json::from_str::<Instruction>(
            r#"{"target":"55","mode":"text","task_id":"abc"}"#
        )
        .is_err());
    }

    #[test]
    fn file_path_splits_into_attachments() {
        let instruction: Instruction = serde_json::from_str(
            r#"{"target":"55","mode":"file","file_path":"/a/one.png\n/a/two.pdf\n"}"#,
        )
        .expect("parse");
        assert_eq!(
            instruction.attachments(),
            vec![PathBuf::from("/a/one.png"), PathBuf::from("/a/two.pdf")]
        );
        assert!(instruction.validate().is_ok());
    }

    #[test]
    fn validate_applies_mode_rules() {
        let instruction = Instruction::ephemeral("55", SendMode::FileText, Some("hi".into()), &[]);
        assert!(matches!(
            instruction.validate(),
            Err(SchedulerError::Validation(_))
        ));
    }

    #[test]
    fn sidecar_is_single_line_and_taken_once() {
        let temp = TempDir::new().expect("tempdir");
        let instruction_path = temp.path().join("now_1.json");
        let written = write_sidecar(&instruction_path, "element not found:\nsend_button")
            .expect("write");
        assert_eq!(written, temp.path().join("now_1.status"));
        let raw = fs::read_to_string(&written).expect("read raw");
        assert_eq!(raw, "FAILED: element not found: send_button\n");

        let reason = take_sidecar(&instruction_path).expect("take");
        assert_eq!(reason.as_deref(), Some("element not found: send_button"));
        assert!(!written.exists());
        assert_eq!(take_sidecar(&instruction_path).expect("again"), None);
    }
}
