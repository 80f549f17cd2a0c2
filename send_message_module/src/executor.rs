use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::catalog::{
    SelectorCatalog, APP_READY, ATTACH_BUTTON, CAPTION_BOX, DOCUMENT_ENTRY, MEDIA_ENTRY,
    MESSAGE_BOX, SEARCH_BOX, SEND_BUTTON,
};
use crate::errors::SendError;
use crate::fallback::{activate_first, wait_for_any, Activation, FallbackBudget};
use crate::session::{
    AutomationElement, AutomationSession, SessionGuard, SessionLauncher, SessionOptions,
};
use crate::settings::SendTimeouts;

/// Receives one line per send step.
pub trait ActionLog: Send + Sync {
    fn record(&self, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl ActionLog for TracingLog {
    fn record(&self, message: &str) {
        info!("{}", message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendContent {
    Text(String),
    Files {
        attachments: Vec<PathBuf>,
        caption: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Media,
    Document,
}

impl AttachmentKind {
    /// Images and videos go through the media entry, everything else is sent
    /// as a document.
    pub fn classify(path: &Path) -> Self {
        match mime_guess::from_path(path).first() {
            Some(mime) if mime.type_() == mime_guess::mime::IMAGE => AttachmentKind::Media,
            Some(mime) if mime.type_() == mime_guess::mime::VIDEO => AttachmentKind::Media,
            _ => AttachmentKind::Document,
        }
    }

    fn menu_entry(&self) -> &'static str {
        match self {
            AttachmentKind::Media => MEDIA_ENTRY,
            AttachmentKind::Document => DOCUMENT_ENTRY,
        }
    }
}

/// Absolute paths for every attachment, each checked to be a readable file.
pub fn resolve_attachments(paths: &[PathBuf]) -> Result<Vec<PathBuf>, SendError> {
    if paths.is_empty() {
        return Err(SendError::InvalidRequest(
            "file sends need at least one attachment".to_string(),
        ));
    }
    let cwd = env::current_dir()?;
    paths
        .iter()
        .map(|path| {
            if path.as_os_str().is_empty() {
                return Err(SendError::AttachmentResolution {
                    path: path.clone(),
                    reason: "empty path".to_string(),
                });
            }
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                cwd.join(path)
            };
            let metadata = fs::metadata(&absolute).map_err(|err| SendError::AttachmentResolution {
                path: absolute.clone(),
                reason: err.to_string(),
            })?;
            if !metadata.is_file() {
                return Err(SendError::AttachmentResolution {
                    path: absolute,
                    reason: "not a regular file".to_string(),
                });
            }
            File::open(&absolute).map_err(|err| SendError::AttachmentResolution {
                path: absolute.clone(),
                reason: err.to_string(),
            })?;
            Ok(absolute)
        })
        .collect()
}

/// Drives the send sequence against an open session. Every element is found
/// through the ranked fallback using the catalog's candidates.
pub struct ActionExecutor {
    catalog: SelectorCatalog,
    timeouts: SendTimeouts,
    log: Arc<dyn ActionLog>,
    screenshot_dir: Option<PathBuf>,
}

impl ActionExecutor {
    pub fn new(catalog: SelectorCatalog, timeouts: SendTimeouts) -> Self {
        Self {
            catalog,
            timeouts,
            log: Arc::new(TracingLog),
            screenshot_dir: None,
        }
    }

    pub fn with_log(mut self, log: Arc<dyn ActionLog>) -> Self {
        self.log = log;
        self
    }

    /// Where a screenshot of the page goes when the remote interface never
    /// becomes ready. Hidden sessions leave no other trace of what the page
    /// showed.
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    pub fn timeouts(&self) -> &SendTimeouts {
        &self.timeouts
    }

    fn budget(&self) -> FallbackBudget {
        self.timeouts.fallback_budget()
    }

    fn settle(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }

    /// Long one-time wait for the remote interface, e.g. while a saved login
    /// is restored. Timing out is a session start failure.
    pub fn wait_until_ready<S: AutomationSession>(&self, session: &S) -> Result<(), SendError> {
        let candidates = self.catalog.candidates(APP_READY)?;
        if let Err(err) = wait_for_any(
            session,
            APP_READY,
            candidates,
            self.timeouts.ready,
            self.timeouts.poll_interval,
        ) {
            self.save_screenshot(session, "ready_timeout");
            return Err(err);
        }
        self.log.record("remote interface ready");
        Ok(())
    }

    fn save_screenshot<S: AutomationSession>(&self, session: &S, label: &str) {
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let path = dir.join(format!("{}_{}.png", label, stamp));
        let saved = session.screenshot().and_then(|png| match png {
            Some(png) => {
                fs::create_dir_all(dir)?;
                fs::write(&path, png)?;
                Ok(true)
            }
            None => Ok(false),
        });
        match saved {
            Ok(true) => self
                .log
                .record(&format!("screenshot saved to {}", path.display())),
            Ok(false) => {}
            Err(err) => warn!("screenshot {} not saved: {}", path.display(), err),
        }
    }

    pub fn perform_send<S: AutomationSession>(
        &self,
        session: &S,
        target: &str,
        content: &SendContent,
    ) -> Result<(), SendError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(SendError::InvalidRequest("target is empty".to_string()));
        }
        let resolved = match content {
            SendContent::Text(message) if message.trim().is_empty() => {
                return Err(SendError::InvalidRequest("message is empty".to_string()))
            }
            SendContent::Text(_) => Vec::new(),
            SendContent::Files { attachments, .. } => resolve_attachments(attachments)?,
        };

        self.open_conversation(session, target)?;
        match content {
            SendContent::Text(message) => self.send_text(session, message),
            SendContent::Files { caption, .. } => {
                self.send_files(session, &resolved, caption.as_deref())
            }
        }
    }

    fn open_conversation<S: AutomationSession>(
        &self,
        session: &S,
        target: &str,
    ) -> Result<(), SendError> {
        let found = activate_first(
            session,
            SEARCH_BOX,
            self.catalog.candidates(SEARCH_BOX)?,
            Activation::Paste(target),
            &self.budget(),
            self.log.as_ref(),
        )?;
        found.element.confirm()?;
        self.settle(self.timeouts.settle);
        self.log.record(&format!("conversation with {} opened", target));
        Ok(())
    }

    fn send_text<S: AutomationSession>(&self, session: &S, message: &str) -> Result<(), SendError> {
        let found = activate_first(
            session,
            MESSAGE_BOX,
            self.catalog.candidates(MESSAGE_BOX)?,
            Activation::Paste(message),
            &self.budget(),
            self.log.as_ref(),
        )?;
        found.element.confirm()?;
        self.settle(self.timeouts.settle);
        self.log.record("text message sent");
        Ok(())
    }

    fn send_files<S: AutomationSession>(
        &self,
        session: &S,
        attachments: &[PathBuf],
        caption: Option<&str>,
    ) -> Result<(), SendError> {
        activate_first(
            session,
            ATTACH_BUTTON,
            self.catalog.candidates(ATTACH_BUTTON)?,
            Activation::Click,
            &self.budget(),
            self.log.as_ref(),
        )?;
        self.settle(self.timeouts.settle / 2);

        let kind = attachments
            .first()
            .map(|path| AttachmentKind::classify(path))
            .unwrap_or(AttachmentKind::Document);
        let entry = kind.menu_entry();
        activate_first(
            session,
            entry,
            self.catalog.candidates(entry)?,
            Activation::Click,
            &self.budget(),
            self.log.as_ref(),
        )?;
        session.choose_files(attachments)?;
        self.log
            .record(&format!("{} file(s) selected as {:?}", attachments.len(), kind));
        self.settle(self.timeouts.settle);

        if let Some(caption) = caption.map(str::trim).filter(|value| !value.is_empty()) {
            activate_first(
                session,
                CAPTION_BOX,
                self.catalog.candidates(CAPTION_BOX)?,
                Activation::Paste(caption),
                &self.budget(),
                self.log.as_ref(),
            )?;
        }

        activate_first(
            session,
            SEND_BUTTON,
            self.catalog.candidates(SEND_BUTTON)?,
            Activation::Click,
            &self.budget(),
            self.log.as_ref(),
        )?;
        self.settle(self.timeouts.upload_settle);
        self.log.record("files sent");
        Ok(())
    }
}

/// Starts a session on `profile_dir`, opens `remote_url`, waits for it and
/// performs one send. The session is closed on every path out.
pub fn send_with_fresh_session<L: SessionLauncher>(
    launcher: &L,
    profile_dir: &Path,
    options: &SessionOptions,
    remote_url: &str,
    executor: &ActionExecutor,
    target: &str,
    content: &SendContent,
) -> Result<(), SendError> {
    fs::create_dir_all(profile_dir)?;
    let session = SessionGuard::new(launcher.start_session(profile_dir, options)?);
    session
        .navigate(remote_url)
        .map_err(|err| SendError::SessionStart(format!("cannot open {}: {}", remote_url, err)))?;
    executor.wait_until_ready(&*session)?;
    executor.perform_send(&*session, target, content)?;
    session.finish();
    Ok(())
}
