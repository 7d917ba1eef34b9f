//! The transfer interaction routine
//!
//! One routine serves both navigation strategies: the caller passes a
//! [`NavigationTarget`] and the steps are otherwise identical.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Timing;
use crate::console::ConsoleRecord;
use crate::error::{E2eError, E2eResult};
use crate::intercept::CapturedRequest;
use crate::navigation::NavigationTarget;
use crate::page::Page;
use crate::scenario::Scenario;

pub const RECIPIENT_SELECTOR: &str = "#recipient";
pub const AMOUNT_SELECTOR: &str = "#amount";
pub const SUBMIT_SELECTOR: &str = "button[type=\"submit\"]";
pub const SUCCESS_SELECTOR: &str = ".message.success";
pub const ERROR_SELECTOR: &str = ".message.error";
pub const TERMINAL_SELECTOR: &str = ".message.success, .message.error";

/// Which terminal message the page ended on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    Success,
    Error,
    /// No terminal message appeared
    #[default]
    None,
}

/// Record of one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything observed while driving one scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioOutcome {
    pub terminal: TerminalState,
    pub terminal_text: Option<String>,
    pub captured: Vec<CapturedRequest>,
    pub console: Vec<ConsoleRecord>,

    /// The terminal wait ran out
    pub timed_out: bool,
    pub timeout_ms: u64,
    pub steps: Vec<StepRecord>,
}

impl ScenarioOutcome {
    /// The request the scenario cares about: the last one intercepted
    pub fn last_request(&self) -> Option<&CapturedRequest> {
        self.captured.last()
    }
}

/// Collects step records while the routine runs
struct Steps {
    records: Vec<StepRecord>,
}

impl Steps {
    fn new() -> Self {
        Self { records: Vec::new() }
    }

    fn record<T>(&mut self, name: impl Into<String>, started: Instant, result: &E2eResult<T>) {
        let name = name.into();
        let duration_ms = started.elapsed().as_millis() as u64;
        let error = result.as_ref().err().map(|e| e.to_string());
        debug!("step {} finished in {} ms (ok: {})", name, duration_ms, error.is_none());
        self.records.push(StepRecord {
            name,
            success: error.is_none(),
            duration_ms,
            error,
        });
    }
}

macro_rules! step {
    ($steps:expr, $name:expr, $body:expr) => {{
        let started = Instant::now();
        let result = $body;
        $steps.record($name, started, &result);
        result?
    }};
}

/// Drive the page through a transfer and collect what it produced.
///
/// Only harness problems are returned as errors. A terminal wait that runs
/// out is reported through [`ScenarioOutcome::timed_out`] so expectations
/// can decide whether that was the point of the scenario.
pub async fn drive(
    page: &mut Page,
    target: &NavigationTarget,
    scenario: &Scenario,
    timing: &Timing,
) -> E2eResult<ScenarioOutcome> {
    let mut steps = Steps::new();

    if let Some(responder) = scenario.fixture.responder()? {
        step!(steps, format!("route:{}", scenario.route), page.route(&scenario.route, responder));
    } else {
        debug!("Scenario {} registers no route", scenario.name);
    }

    let url = target.url()?;
    step!(steps, format!("navigate:{}", url), page.goto(url.as_str()).await);
    step!(steps, "wait:load", page.wait_for_load().await);
    step!(steps, format!("fill:{}", RECIPIENT_SELECTOR), page.fill(RECIPIENT_SELECTOR, &scenario.recipient));
    step!(steps, format!("fill:{}", AMOUNT_SELECTOR), page.fill(AMOUNT_SELECTOR, &scenario.amount));
    step!(steps, format!("click:{}", SUBMIT_SELECTOR), page.click(SUBMIT_SELECTOR));

    let started = Instant::now();
    let waited = page.wait_for_selector(TERMINAL_SELECTOR, timing.wait_timeout()).await;
    steps.record(format!("wait:{}", TERMINAL_SELECTOR), started, &waited);

    let mut outcome = ScenarioOutcome {
        timeout_ms: timing.wait_timeout_ms,
        ..Default::default()
    };

    match waited {
        Ok(()) => {
            outcome.terminal = if page.is_visible(SUCCESS_SELECTOR)? {
                TerminalState::Success
            } else {
                TerminalState::Error
            };
            outcome.terminal_text = page.text_content(TERMINAL_SELECTOR)?;
            info!(
                "Terminal state {:?}: {}",
                outcome.terminal,
                outcome.terminal_text.as_deref().unwrap_or("")
            );
        }
        Err(E2eError::Timeout { .. }) => {
            info!("No terminal message within {} ms", timing.wait_timeout_ms);
            outcome.timed_out = true;
        }
        Err(e) => return Err(e),
    }

    let started = Instant::now();
    page.wait_for_timeout(timing.settle_delay()).await;
    steps.record::<()>("settle", started, &Ok(()));

    outcome.captured = page.captured_requests();
    outcome.console = page.console().snapshot();
    outcome.steps = steps.records;
    Ok(outcome)
}
