pub mod catalog;
pub mod errors;
pub mod executor;
pub mod fallback;
pub mod session;
pub mod settings;
pub mod webdriver;

pub use catalog::SelectorCatalog;
pub use errors::SendError;
pub use executor::{
    resolve_attachments, send_with_fresh_session, ActionExecutor, ActionLog, AttachmentKind,
    SendContent, TracingLog,
};
pub use fallback::{activate_first, wait_for_any, Activation, FallbackBudget, Found};
pub use session::{
    AutomationElement, AutomationSession, Locator, LocatorStrategy, SessionGuard,
    SessionLauncher, SessionOptions,
};
pub use settings::{SendSettings, SendTimeouts};
pub use webdriver::{WebDriverElement, WebDriverLauncher, WebDriverSession};
