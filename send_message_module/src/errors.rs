use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("element not found: {element} ({tried} candidates tried)")]
    ElementNotFound { element: String, tried: usize },
    #[error("attachment {} cannot be used: {reason}", .path.display())]
    AttachmentResolution { path: PathBuf, reason: String },
    #[error("session start failed: {0}")]
    SessionStart(String),
    #[error("webdriver {command} failed: {message}")]
    WebDriver { command: String, message: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("selector catalog error: {0}")]
    Catalog(String),
    #[error("invalid send request: {0}")]
    InvalidRequest(String),
}
