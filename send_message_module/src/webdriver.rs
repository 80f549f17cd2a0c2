//! Minimal W3C WebDriver client (chromedriver) over blocking HTTP.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::SendError;
use crate::session::{
    AutomationElement, AutomationSession, Locator, SessionLauncher, SessionOptions,
};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const KEY_ENTER: &str = "\u{E007}";
const KEY_SHIFT: &str = "\u{E008}";
const KEY_RELEASE_ALL: &str = "\u{E000}";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Transport {
    client: Client,
    base_url: String,
}

impl Transport {
    fn new(base_url: &str) -> Result<Self, SendError> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Sends one command and unwraps the `value` member of the reply. Error
    /// replies become `SendError::WebDriver` with the driver's message.
    fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        label: &str,
    ) -> Result<Value, SendError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("webdriver {} {}", method, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        let payload: Value = match serde_json::from_str(&body) {
            Ok(payload) => payload,
            Err(_) if !status.is_success() => {
                return Err(SendError::WebDriver {
                    command: label.to_string(),
                    message: format!("http status {}", status),
                })
            }
            Err(err) => return Err(err.into()),
        };
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(SendError::WebDriver {
                command: label.to_string(),
                message: format!("{}: {}", error, message),
            });
        }
        if !status.is_success() {
            return Err(SendError::WebDriver {
                command: label.to_string(),
                message: format!("http status {}", status),
            });
        }
        Ok(value)
    }
}

/// Starts Chrome sessions through a running chromedriver.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    transport: Transport,
}

impl WebDriverLauncher {
    pub fn new(webdriver_url: &str) -> Result<Self, SendError> {
        Ok(Self {
            transport: Transport::new(webdriver_url)?,
        })
    }
}

impl SessionLauncher for WebDriverLauncher {
    type Session = WebDriverSession;

    fn start_session(
        &self,
        profile_dir: &Path,
        options: &SessionOptions,
    ) -> Result<WebDriverSession, SendError> {
        let mut chrome_options = json!({ "args": options.browser_args(profile_dir) });
        if let Some(binary) = &options.browser_binary {
            chrome_options["binary"] = json!(binary.display().to_string());
        }
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": chrome_options,
                }
            }
        });
        let value = self
            .transport
            .command(Method::POST, "/session", Some(body), "new session")
            .map_err(|err| SendError::SessionStart(err.to_string()))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SendError::SessionStart("reply carried no sessionId".to_string()))?
            .to_string();
        info!(
            "browser session {} started on profile {}",
            session_id,
            profile_dir.display()
        );
        Ok(WebDriverSession {
            transport: self.transport.clone(),
            session_id,
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
pub struct WebDriverSession {
    transport: Transport,
    session_id: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.session_id, suffix)
    }

    fn find_last(&self, using: &str, value: &str) -> Result<Option<WebDriverElement>, SendError> {
        let found = self.transport.command(
            Method::POST,
            &self.path("/elements"),
            Some(json!({ "using": using, "value": value })),
            "find elements",
        )?;
        let element_id = found
            .as_array()
            .and_then(|elements| elements.last())
            .and_then(|element| element.get(ELEMENT_KEY))
            .and_then(Value::as_str);
        Ok(element_id.map(|element_id| WebDriverElement {
            transport: self.transport.clone(),
            session_id: self.session_id.clone(),
            element_id: element_id.to_string(),
        }))
    }
}

impl AutomationSession for WebDriverSession {
    type Element = WebDriverElement;

    fn navigate(&self, address: &str) -> Result<(), SendError> {
        self.transport.command(
            Method::POST,
            &self.path("/url"),
            Some(json!({ "url": address })),
            "navigate",
        )?;
        Ok(())
    }

    fn locate(&self, locator: &Locator) -> Result<Option<WebDriverElement>, SendError> {
        self.find_last(locator.strategy.webdriver_name(), &locator.value)
    }

    fn choose_files(&self, paths: &[PathBuf]) -> Result<(), SendError> {
        let input = self
            .find_last("css selector", "input[type='file']")?
            .ok_or_else(|| SendError::ElementNotFound {
                element: "file_input".to_string(),
                tried: 1,
            })?;
        let joined = paths
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        input.send_keys(&joined)
    }

    fn screenshot(&self) -> Result<Option<Vec<u8>>, SendError> {
        let value = self.transport.command(
            Method::GET,
            &self.path("/screenshot"),
            None,
            "take screenshot",
        )?;
        let encoded = value.as_str().ok_or_else(|| SendError::WebDriver {
            command: "take screenshot".to_string(),
            message: "reply carried no image".to_string(),
        })?;
        let png = BASE64_STANDARD
            .decode(encoded)
            .map_err(|err| SendError::WebDriver {
                command: "take screenshot".to_string(),
                message: format!("invalid image encoding: {}", err),
            })?;
        Ok(Some(png))
    }

    fn close(&self) -> Result<(), SendError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport
            .command(Method::DELETE, &self.path(""), None, "delete session")?;
        info!("browser session {} closed", self.session_id);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WebDriverElement {
    transport: Transport,
    session_id: String,
    element_id: String,
}

impl WebDriverElement {
    fn path(&self, suffix: &str) -> String {
        format!(
            "/session/{}/element/{}{}",
            self.session_id, self.element_id, suffix
        )
    }

    fn send_keys(&self, text: &str) -> Result<(), SendError> {
        self.transport.command(
            Method::POST,
            &self.path("/value"),
            Some(json!({ "text": text })),
            "send keys",
        )?;
        Ok(())
    }
}

/// Newlines become Shift+Enter so multi-line text stays in the box instead
/// of submitting line by line.
fn encode_text(text: &str) -> String {
    let line_break = format!("{}{}{}", KEY_SHIFT, KEY_ENTER, KEY_RELEASE_ALL);
    text.replace("\r\n", "\n").replace('\n', &line_break)
}

impl AutomationElement for WebDriverElement {
    fn is_visible(&self) -> Result<bool, SendError> {
        let value = self.transport.command(
            Method::GET,
            &self.path("/displayed"),
            None,
            "element displayed",
        )?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn scroll_into_view(&self) -> Result<(), SendError> {
        self.transport.command(
            Method::POST,
            &format!("/session/{}/execute/sync", self.session_id),
            Some(json!({
                "script": "arguments[0].scrollIntoView({block: 'center'});",
                "args": [{ ELEMENT_KEY: self.element_id }],
            })),
            "scroll into view",
        )?;
        Ok(())
    }

    fn activate(&self) -> Result<(), SendError> {
        self.transport.command(
            Method::POST,
            &self.path("/click"),
            Some(json!({})),
            "element click",
        )?;
        Ok(())
    }

    fn set_content(&self, text: &str) -> Result<(), SendError> {
        self.send_keys(&encode_text(text))
    }

    fn confirm(&self) -> Result<(), SendError> {
        self.send_keys(KEY_ENTER)
    }
}

#[cfg(test)]
mod tests {
    use super::encode_text;

    #[test]
    fn newlines_are_sent_as_shift_enter() {
        assert_eq!(encode_text("a\nb"), "a\u{E008}\u{E007}\u{E000}b");
        assert_eq!(encode_text("a\r\nb"), "a\u{E008}\u{E007}\u{E000}b");
        assert_eq!(encode_text("plain"), "plain");
    }
}
