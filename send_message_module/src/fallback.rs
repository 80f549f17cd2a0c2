//! Ranked fallback over locator candidates.
//!
//! Each logical element has candidates ordered from most to least trusted.
//! Candidates are tried in order, each for at most `per_candidate`; the first
//! one that is found, visible and accepts activation wins and the rest are
//! never touched. The whole step is capped by `overall`.

use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::errors::SendError;
use crate::executor::ActionLog;
use crate::session::{AutomationElement, AutomationSession, Locator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackBudget {
    pub per_candidate: Duration,
    pub overall: Duration,
    pub poll_interval: Duration,
}

impl Default for FallbackBudget {
    fn default() -> Self {
        Self {
            per_candidate: Duration::from_millis(800),
            overall: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// What to do with the element once it is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation<'a> {
    Click,
    /// Click, then enter the text.
    Paste(&'a str),
}

#[derive(Debug)]
pub struct Found<E> {
    pub element: E,
    /// Zero-based position of the winning candidate.
    pub index: usize,
    pub locator: Locator,
}

#[derive(Debug)]
struct CandidateMiss {
    reason: String,
}

/// Finds and activates the first working candidate for `name`. Fails with
/// `ElementNotFound` carrying how many candidates were attempted.
pub fn activate_first<S: AutomationSession>(
    session: &S,
    name: &str,
    candidates: &[Locator],
    activation: Activation<'_>,
    budget: &FallbackBudget,
    log: &dyn ActionLog,
) -> Result<Found<S::Element>, SendError> {
    let started = Instant::now();
    let mut tried = 0;
    for (index, locator) in candidates.iter().enumerate() {
        let remaining = budget.overall.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            debug!("{}: step budget spent after {} candidates", name, tried);
            break;
        }
        tried += 1;
        let timeout = budget.per_candidate.min(remaining);
        match try_candidate(session, locator, activation, timeout, budget.poll_interval) {
            Ok(element) => {
                log.record(&format!(
                    "{}: candidate {} of {} matched ({})",
                    name,
                    index + 1,
                    candidates.len(),
                    locator
                ));
                return Ok(Found {
                    element,
                    index,
                    locator: locator.clone(),
                });
            }
            Err(miss) => debug!("{}: {} missed: {}", name, locator, miss.reason),
        }
    }
    log.record(&format!("{}: no candidate matched ({} tried)", name, tried));
    Err(SendError::ElementNotFound {
        element: name.to_string(),
        tried,
    })
}

/// One candidate, polled until it works or `timeout` passes. Always makes at
/// least one attempt.
fn try_candidate<S: AutomationSession>(
    session: &S,
    locator: &Locator,
    activation: Activation<'_>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<S::Element, CandidateMiss> {
    let deadline = Instant::now() + timeout;
    loop {
        let reason = match attempt(session, locator, activation) {
            Ok(element) => return Ok(element),
            Err(reason) => reason,
        };
        let now = Instant::now();
        if now >= deadline {
            return Err(CandidateMiss { reason });
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
}

fn attempt<S: AutomationSession>(
    session: &S,
    locator: &Locator,
    activation: Activation<'_>,
) -> Result<S::Element, String> {
    let element = session
        .locate(locator)
        .map_err(|err| err.to_string())?
        .ok_or_else(|| "no match".to_string())?;
    if !element.is_visible().map_err(|err| err.to_string())? {
        return Err("not visible".to_string());
    }
    element.scroll_into_view().map_err(|err| err.to_string())?;
    element.activate().map_err(|err| err.to_string())?;
    if let Activation::Paste(text) = activation {
        element.set_content(text).map_err(|err| err.to_string())?;
    }
    Ok(element)
}

/// Waits up to `timeout` for any candidate to be visible; used for the
/// one-time page readiness check. Returns the index that appeared.
pub fn wait_for_any<S: AutomationSession>(
    session: &S,
    name: &str,
    candidates: &[Locator],
    timeout: Duration,
    poll_interval: Duration,
) -> Result<usize, SendError> {
    let deadline = Instant::now() + timeout;
    loop {
        for (index, locator) in candidates.iter().enumerate() {
            if let Ok(Some(element)) = session.locate(locator) {
                if element.is_visible().unwrap_or(false) {
                    return Ok(index);
                }
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(SendError::SessionStart(format!(
                "{} not visible after {}s",
                name,
                timeout.as_secs()
            )));
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    struct QuietLog;

    impl ActionLog for QuietLog {
        fn record(&self, _message: &str) {}
    }

    #[derive(Debug)]
    struct FakeElement {
        clicks: RefCell<usize>,
    }

    impl AutomationElement for FakeElement {
        fn is_visible(&self) -> Result<bool, SendError> {
            Ok(true)
        }
        fn scroll_into_view(&self) -> Result<(), SendError> {
            Ok(())
        }
        fn activate(&self) -> Result<(), SendError> {
            *self.clicks.borrow_mut() += 1;
            Ok(())
        }
        fn set_content(&self, _text: &str) -> Result<(), SendError> {
            Ok(())
        }
        fn confirm(&self) -> Result<(), SendError> {
            Ok(())
        }
    }

    /// Resolves only the locators listed in `resolvable`; records every
    /// locate call.
    struct FakeSession {
        resolvable: Vec<String>,
        located: RefCell<Vec<String>>,
    }

    impl AutomationSession for FakeSession {
        type Element = FakeElement;

        fn navigate(&self, _address: &str) -> Result<(), SendError> {
            Ok(())
        }
        fn locate(&self, locator: &Locator) -> Result<Option<FakeElement>, SendError> {
            self.located.borrow_mut().push(locator.value.clone());
            if self.resolvable.contains(&locator.value) {
                Ok(Some(FakeElement {
                    clicks: RefCell::new(0),
                }))
            } else {
                Ok(None)
            }
        }
        fn choose_files(&self, _paths: &[PathBuf]) -> Result<(), SendError> {
            Ok(())
        }
        fn close(&self) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn candidates() -> Vec<Locator> {
        (1..=5).map(|n| Locator::css(format!("#c{}", n))).collect()
    }

    fn quick_budget() -> FallbackBudget {
        FallbackBudget {
            per_candidate: Duration::from_millis(20),
            overall: Duration::from_secs(5),
            poll_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn picks_fourth_candidate_and_never_tries_fifth() {
        let session = FakeSession {
            resolvable: vec!["#c4".to_string(), "#c5".to_string()],
            located: RefCell::new(Vec::new()),
        };
        let found = activate_first(
            &session,
            "send_button",
            &candidates(),
            Activation::Click,
            &quick_budget(),
            &QuietLog,
        )
        .expect("found");
        assert_eq!(found.index, 3);
        assert_eq!(found.locator, Locator::css("#c4"));
        assert_eq!(*found.element.clicks.borrow(), 1);

        let located = session.located.borrow();
        assert!(located.iter().any(|value| value == "#c1"));
        assert!(located.iter().any(|value| value == "#c3"));
        assert!(!located.iter().any(|value| value == "#c5"));
        assert_eq!(located.last().map(String::as_str), Some("#c4"));
    }

    #[test]
    fn reports_element_name_and_candidates_tried() {
        let session = FakeSession {
            resolvable: Vec::new(),
            located: RefCell::new(Vec::new()),
        };
        let err = activate_first(
            &session,
            "attach_button",
            &candidates(),
            Activation::Click,
            &quick_budget(),
            &QuietLog,
        )
        .expect_err("nothing resolves");
        match err {
            SendError::ElementNotFound { element, tried } => {
                assert_eq!(element, "attach_button");
                assert_eq!(tried, 5);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            err_message("attach_button", 5),
            "element not found: attach_button (5 candidates tried)"
        );
    }

    fn err_message(element: &str, tried: usize) -> String {
        SendError::ElementNotFound {
            element: element.to_string(),
            tried,
        }
        .to_string()
    }

    #[test]
    fn overall_budget_stops_the_walk() {
        let session = FakeSession {
            resolvable: vec!["#c5".to_string()],
            located: RefCell::new(Vec::new()),
        };
        let budget = FallbackBudget {
            per_candidate: Duration::from_millis(30),
            overall: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
        };
        let err = activate_first(
            &session,
            "search_box",
            &candidates(),
            Activation::Click,
            &budget,
            &QuietLog,
        )
        .expect_err("budget runs out");
        match err {
            SendError::ElementNotFound { tried, .. } => assert!(tried < 5),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn readiness_wait_times_out_as_session_failure() {
        let session = FakeSession {
            resolvable: Vec::new(),
            located: RefCell::new(Vec::new()),
        };
        let err = wait_for_any(
            &session,
            "app_ready",
            &candidates(),
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .expect_err("never ready");
        assert!(matches!(err, SendError::SessionStart(_)));

        let ready = FakeSession {
            resolvable: vec!["#c2".to_string()],
            located: RefCell::new(Vec::new()),
        };
        let index = wait_for_any(
            &ready,
            "app_ready",
            &candidates(),
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .expect("ready");
        assert_eq!(index, 1);
    }
}
