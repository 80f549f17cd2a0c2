use send_message_module::catalog::ELEMENT_NAMES;
use send_message_module::{
    send_with_fresh_session, ActionExecutor, ActionLog, AttachmentKind, AutomationElement,
    AutomationSession, Locator, SelectorCatalog, SendContent, SendError, SendTimeouts,
    SessionLauncher, SessionOptions,
};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Journal = Rc<RefCell<Vec<String>>>;

struct FakeElement {
    name: String,
    journal: Journal,
}

impl AutomationElement for FakeElement {
    fn is_visible(&self) -> Result<bool, SendError> {
        Ok(true)
    }
    fn scroll_into_view(&self) -> Result<(), SendError> {
        Ok(())
    }
    fn activate(&self) -> Result<(), SendError> {
        self.journal.borrow_mut().push(format!("click {}", self.name));
        Ok(())
    }
    fn set_content(&self, text: &str) -> Result<(), SendError> {
        self.journal
            .borrow_mut()
            .push(format!("type {} {}", self.name, text));
        Ok(())
    }
    fn confirm(&self) -> Result<(), SendError> {
        self.journal.borrow_mut().push(format!("enter {}", self.name));
        Ok(())
    }
}

/// Resolves `#<name>` locators for the elements in `present`; the stale
/// `#<name>-old` candidates never match.
struct FakeSession {
    present: Vec<String>,
    journal: Journal,
}

impl AutomationSession for FakeSession {
    type Element = FakeElement;

    fn navigate(&self, address: &str) -> Result<(), SendError> {
        self.journal.borrow_mut().push(format!("navigate {}", address));
        Ok(())
    }

    fn locate(&self, locator: &Locator) -> Result<Option<FakeElement>, SendError> {
        let name = locator.value.trim_start_matches('#');
        if self.present.iter().any(|present| present == name) {
            Ok(Some(FakeElement {
                name: name.to_string(),
                journal: Rc::clone(&self.journal),
            }))
        } else {
            Ok(None)
        }
    }

    fn choose_files(&self, paths: &[PathBuf]) -> Result<(), SendError> {
        let names: Vec<String> = paths
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        self.journal
            .borrow_mut()
            .push(format!("files {}", names.join(",")));
        Ok(())
    }

    fn screenshot(&self) -> Result<Option<Vec<u8>>, SendError> {
        self.journal.borrow_mut().push("screenshot".to_string());
        Ok(Some(b"fake-png".to_vec()))
    }

    fn close(&self) -> Result<(), SendError> {
        self.journal.borrow_mut().push("close".to_string());
        Ok(())
    }
}

struct FakeLauncher {
    present: Vec<String>,
    journal: Journal,
}

impl SessionLauncher for FakeLauncher {
    type Session = FakeSession;

    fn start_session(
        &self,
        _profile_dir: &Path,
        _options: &SessionOptions,
    ) -> Result<FakeSession, SendError> {
        self.journal.borrow_mut().push("start".to_string());
        Ok(FakeSession {
            present: self.present.clone(),
            journal: Rc::clone(&self.journal),
        })
    }
}

#[derive(Default)]
struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl ActionLog for MemoryLog {
    fn record(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
    }
}

fn catalog() -> SelectorCatalog {
    let mut catalog = SelectorCatalog::builtin();
    for name in ELEMENT_NAMES {
        catalog.set(
            name,
            vec![
                Locator::css(format!("#{}-old", name)),
                Locator::css(format!("#{}", name)),
            ],
        );
    }
    catalog
}

fn timeouts() -> SendTimeouts {
    SendTimeouts {
        ready: Duration::from_millis(50),
        per_candidate: Duration::from_millis(5),
        step_budget: Duration::from_secs(1),
        poll_interval: Duration::from_millis(1),
        settle: Duration::ZERO,
        upload_settle: Duration::ZERO,
    }
}

fn all_present() -> Vec<String> {
    ELEMENT_NAMES.iter().map(|name| name.to_string()).collect()
}

fn session(present: Vec<String>) -> (FakeSession, Journal) {
    let journal: Journal = Rc::new(RefCell::new(Vec::new()));
    (
        FakeSession {
            present,
            journal: Rc::clone(&journal),
        },
        journal,
    )
}

#[test]
fn text_send_searches_then_types_and_confirms() {
    let (session, journal) = session(all_present());
    let log = Arc::new(MemoryLog::default());
    let executor = ActionExecutor::new(catalog(), timeouts()).with_log(log.clone());

    executor
        .perform_send(&session, "5511999999999", &SendContent::Text("hi".to_string()))
        .expect("send");

    assert_eq!(
        *journal.borrow(),
        vec![
            "click search_box",
            "type search_box 5511999999999",
            "enter search_box",
            "click message_box",
            "type message_box hi",
            "enter message_box",
        ]
    );
    let lines = log.lines.lock().expect("log");
    assert!(lines
        .iter()
        .any(|line| line.contains("search_box: candidate 2 of 2 matched")));
}

#[test]
fn file_send_picks_category_and_sets_caption() {
    let temp = TempDir::new().expect("tempdir");
    let photo = temp.path().join("photo.jpg");
    let report = temp.path().join("report.pdf");
    fs::write(&photo, b"jpg").expect("photo");
    fs::write(&report, b"pdf").expect("report");

    let (session, journal) = session(all_present());
    let executor = ActionExecutor::new(catalog(), timeouts());
    executor
        .perform_send(
            &session,
            "5511",
            &SendContent::Files {
                attachments: vec![photo, report],
                caption: Some("see attached".to_string()),
            },
        )
        .expect("send");

    assert_eq!(
        *journal.borrow(),
        vec![
            "click search_box",
            "type search_box 5511",
            "enter search_box",
            "click attach_button",
            "click media_entry",
            "files photo.jpg,report.pdf",
            "click caption_box",
            "type caption_box see attached",
            "click send_button",
        ]
    );
}

#[test]
fn documents_use_document_entry_without_caption() {
    let temp = TempDir::new().expect("tempdir");
    let report = temp.path().join("report.pdf");
    fs::write(&report, b"pdf").expect("report");

    let (session, journal) = session(all_present());
    let executor = ActionExecutor::new(catalog(), timeouts());
    executor
        .perform_send(
            &session,
            "5511",
            &SendContent::Files {
                attachments: vec![report],
                caption: None,
            },
        )
        .expect("send");

    let journal = journal.borrow();
    assert!(journal.contains(&"click document_entry".to_string()));
    assert!(!journal.iter().any(|line| line.contains("caption_box")));
    assert_eq!(journal.last().map(String::as_str), Some("click send_button"));
}

#[test]
fn attachment_kind_follows_extension() {
    assert_eq!(AttachmentKind::classify(Path::new("a.PNG")), AttachmentKind::Media);
    assert_eq!(AttachmentKind::classify(Path::new("clip.mp4")), AttachmentKind::Media);
    assert_eq!(AttachmentKind::classify(Path::new("notes.docx")), AttachmentKind::Document);
    assert_eq!(AttachmentKind::classify(Path::new("no_extension")), AttachmentKind::Document);
}

#[test]
fn missing_attachment_fails_before_touching_the_page() {
    let temp = TempDir::new().expect("tempdir");
    let (session, journal) = session(all_present());
    let executor = ActionExecutor::new(catalog(), timeouts());

    let err = executor
        .perform_send(
            &session,
            "5511",
            &SendContent::Files {
                attachments: vec![temp.path().join("gone.pdf")],
                caption: None,
            },
        )
        .expect_err("missing file");
    assert!(matches!(err, SendError::AttachmentResolution { .. }));
    assert!(journal.borrow().is_empty());
}

#[test]
fn missing_element_reports_name_and_count() {
    let present: Vec<String> = all_present()
        .into_iter()
        .filter(|name| name != "message_box")
        .collect();
    let (session, _journal) = session(present);
    let executor = ActionExecutor::new(catalog(), timeouts());

    let err = executor
        .perform_send(&session, "5511", &SendContent::Text("hi".to_string()))
        .expect_err("no message box");
    assert_eq!(
        err.to_string(),
        "element not found: message_box (2 candidates tried)"
    );
}

#[test]
fn fresh_session_is_closed_after_success_and_failure() {
    let temp = TempDir::new().expect("tempdir");
    let journal: Journal = Rc::new(RefCell::new(Vec::new()));
    let launcher = FakeLauncher {
        present: all_present(),
        journal: Rc::clone(&journal),
    };
    let executor = ActionExecutor::new(catalog(), timeouts());
    send_with_fresh_session(
        &launcher,
        &temp.path().join("profiles").join("interactive"),
        &SessionOptions::default(),
        "https://remote.test",
        &executor,
        "5511",
        &SendContent::Text("hi".to_string()),
    )
    .expect("send");
    {
        let journal = journal.borrow();
        assert_eq!(journal.first().map(String::as_str), Some("start"));
        assert_eq!(journal[1], "navigate https://remote.test");
        assert_eq!(journal.last().map(String::as_str), Some("close"));
    }

    journal.borrow_mut().clear();
    let broken = FakeLauncher {
        present: vec!["app_ready".to_string(), "search_box".to_string()],
        journal: Rc::clone(&journal),
    };
    let err = send_with_fresh_session(
        &broken,
        &temp.path().join("profiles").join("interactive"),
        &SessionOptions::default(),
        "https://remote.test",
        &executor,
        "5511",
        &SendContent::Text("hi".to_string()),
    )
    .expect_err("no message box");
    assert!(matches!(err, SendError::ElementNotFound { .. }));
    assert_eq!(journal.borrow().last().map(String::as_str), Some("close"));
}

#[test]
fn page_that_never_loads_is_a_session_failure() {
    let temp = TempDir::new().expect("tempdir");
    let journal: Journal = Rc::new(RefCell::new(Vec::new()));
    let launcher = FakeLauncher {
        present: Vec::new(),
        journal: Rc::clone(&journal),
    };
    let executor = ActionExecutor::new(catalog(), timeouts());
    let err = send_with_fresh_session(
        &launcher,
        &temp.path().join("profile"),
        &SessionOptions::default(),
        "https://remote.test",
        &executor,
        "5511",
        &SendContent::Text("hi".to_string()),
    )
    .expect_err("never ready");
    assert!(matches!(err, SendError::SessionStart(_)));
    assert_eq!(journal.borrow().last().map(String::as_str), Some("close"));
}

#[test]
fn unready_page_is_captured_when_a_screenshot_dir_is_set() {
    let temp = TempDir::new().expect("tempdir");
    let shots = temp.path().join("logs");
    let journal: Journal = Rc::new(RefCell::new(Vec::new()));
    let launcher = FakeLauncher {
        present: Vec::new(),
        journal: Rc::clone(&journal),
    };
    let executor = ActionExecutor::new(catalog(), timeouts()).with_screenshot_dir(shots.clone());
    let err = send_with_fresh_session(
        &launcher,
        &temp.path().join("profile"),
        &SessionOptions::default(),
        "https://remote.test",
        &executor,
        "5511",
        &SendContent::Text("hi".to_string()),
    )
    .expect_err("never ready");
    assert!(matches!(err, SendError::SessionStart(_)));

    let saved: Vec<PathBuf> = fs::read_dir(&shots)
        .expect("screenshot dir")
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    assert_eq!(saved.len(), 1);
    let name = saved[0].file_name().expect("name").to_string_lossy().into_owned();
    assert!(name.starts_with("ready_timeout_") && name.ends_with(".png"));
    assert_eq!(fs::read(&saved[0]).expect("png"), b"fake-png");
    let journal = journal.borrow();
    assert_eq!(journal[journal.len() - 2], "screenshot");
    assert_eq!(journal.last().map(String::as_str), Some("close"));
}
