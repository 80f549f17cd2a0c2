use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::SelectorCatalog;
use crate::errors::SendError;
use crate::fallback::FallbackBudget;

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_REMOTE_URL: &str = "https://web.whatsapp.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendTimeouts {
    /// One-time wait for the remote interface to finish loading.
    pub ready: Duration,
    pub per_candidate: Duration,
    pub step_budget: Duration,
    pub poll_interval: Duration,
    /// Pause after opening a conversation or a menu.
    pub settle: Duration,
    /// Pause after sending files so the upload completes before the session
    /// closes.
    pub upload_settle: Duration,
}

impl Default for SendTimeouts {
    fn default() -> Self {
        Self {
            ready: Duration::from_secs(120),
            per_candidate: Duration::from_millis(800),
            step_budget: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            settle: Duration::from_secs(2),
            upload_settle: Duration::from_secs(15),
        }
    }
}

impl SendTimeouts {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ready: env_u64("SEND_READY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ready),
            per_candidate: env_u64("SEND_CANDIDATE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.per_candidate),
            step_budget: env_u64("SEND_STEP_BUDGET_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.step_budget),
            upload_settle: env_u64("SEND_UPLOAD_SETTLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upload_settle),
            ..defaults
        }
    }

    pub fn fallback_budget(&self) -> FallbackBudget {
        FallbackBudget {
            per_candidate: self.per_candidate,
            overall: self.step_budget,
            poll_interval: self.poll_interval,
        }
    }
}

/// Everything the executor process needs to reach the browser.
#[derive(Debug, Clone)]
pub struct SendSettings {
    pub webdriver_url: String,
    pub remote_url: String,
    pub browser_binary: Option<PathBuf>,
    pub selector_catalog: Option<PathBuf>,
    pub timeouts: SendTimeouts,
}

impl SendSettings {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            webdriver_url: env_var_non_empty("WEBDRIVER_URL")
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
            remote_url: env_var_non_empty("AUTOMESSAGE_REMOTE_URL")
                .unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string()),
            browser_binary: env_var_non_empty("AUTOMESSAGE_BROWSER_BINARY").map(PathBuf::from),
            selector_catalog: env_var_non_empty("AUTOMESSAGE_SELECTOR_CATALOG").map(PathBuf::from),
            timeouts: SendTimeouts::from_env(),
        }
    }

    pub fn load_catalog(&self) -> Result<SelectorCatalog, SendError> {
        match &self.selector_catalog {
            Some(path) => SelectorCatalog::load(path),
            None => Ok(SelectorCatalog::builtin()),
        }
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_var_non_empty(key)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
}
