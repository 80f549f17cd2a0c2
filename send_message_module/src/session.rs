//! The automation capability the send sequence needs, independent of the
//! engine that provides it.

use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::errors::SendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStrategy {
    Css,
    XPath,
}

impl LocatorStrategy {
    /// Name used by the W3C WebDriver "find elements" command.
    pub fn webdriver_name(&self) -> &'static str {
        match self {
            LocatorStrategy::Css => "css selector",
            LocatorStrategy::XPath => "xpath",
        }
    }
}

/// One way of finding an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub strategy: LocatorStrategy,
    pub value: String,
}

impl Locator {
    pub fn css(value: impl Into<String>) -> Self {
        Self {
            strategy: LocatorStrategy::Css,
            value: value.into(),
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            strategy: LocatorStrategy::XPath,
            value: value.into(),
        }
    }
}

/// Accepts `css=<selector>` and `xpath=<expression>`. Without a prefix,
/// anything starting with `/` or `(` is taken as XPath, the rest as CSS.
impl FromStr for Locator {
    type Err = SendError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let locator = if let Some(value) = raw.strip_prefix("css=") {
            Locator::css(value.trim())
        } else if let Some(value) = raw.strip_prefix("xpath=") {
            Locator::xpath(value.trim())
        } else if raw.starts_with('/') || raw.starts_with('(') {
            Locator::xpath(raw)
        } else {
            Locator::css(raw)
        };
        if locator.value.is_empty() {
            return Err(SendError::Catalog(format!("empty locator '{}'", raw)));
        }
        Ok(locator)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.strategy {
            LocatorStrategy::Css => write!(f, "css={}", self.value),
            LocatorStrategy::XPath => write!(f, "xpath={}", self.value),
        }
    }
}

pub trait AutomationElement {
    fn is_visible(&self) -> Result<bool, SendError>;
    fn scroll_into_view(&self) -> Result<(), SendError>;
    /// Click.
    fn activate(&self) -> Result<(), SendError>;
    /// Types `text` into the element; newlines do not submit.
    fn set_content(&self, text: &str) -> Result<(), SendError>;
    /// Presses Enter on the element.
    fn confirm(&self) -> Result<(), SendError>;
}

pub trait AutomationSession {
    type Element: AutomationElement;

    fn navigate(&self, address: &str) -> Result<(), SendError>;
    /// The last match for `locator`, if any. Later matches win because
    /// hidden menus keep stale copies earlier in the document.
    fn locate(&self, locator: &Locator) -> Result<Option<Self::Element>, SendError>;
    /// Hands absolute file paths to the page's file chooser.
    fn choose_files(&self, paths: &[PathBuf]) -> Result<(), SendError>;
    /// PNG of the current page. Backends that cannot take one return
    /// `None`.
    fn screenshot(&self) -> Result<Option<Vec<u8>>, SendError> {
        Ok(None)
    }
    /// Ends the session. Calling it again is a no-op.
    fn close(&self) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Park the window outside the visible desktop (scheduled runs).
    pub offscreen: bool,
    pub browser_binary: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

impl SessionOptions {
    pub fn browser_args(&self, profile_dir: &Path) -> Vec<String> {
        let mut args = vec![
            format!("--user-data-dir={}", profile_dir.display()),
            "--disable-notifications".to_string(),
            "--no-sandbox".to_string(),
            "--start-maximized".to_string(),
        ];
        if self.offscreen {
            args.push("--window-position=9999,9999".to_string());
            args.push("--window-size=1366,768".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

pub trait SessionLauncher {
    type Session: AutomationSession;

    fn start_session(
        &self,
        profile_dir: &Path,
        options: &SessionOptions,
    ) -> Result<Self::Session, SendError>;
}

/// Owns a session and closes it on every exit path.
pub struct SessionGuard<S: AutomationSession> {
    session: S,
}

impl<S: AutomationSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// Closes now. A close failure after a finished send is logged only.
    pub fn finish(self) {
        drop(self);
    }
}

impl<S: AutomationSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: AutomationSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Err(err) = self.session.close() {
            warn!("failed to close automation session: {}", err);
        }
    }
}
