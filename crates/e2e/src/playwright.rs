//! Playwright browser automation
//!
//! Each scenario is rendered into one self-contained Node script that
//! installs the route, drives the page and prints a single outcome line
//! prefixed with [`OUTCOME_MARKER`]. Every literal reaches the script through
//! `serde_json`, so scenario text cannot break out of its string.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use crate::config::Timing;
use crate::error::{E2eError, E2eResult};
use crate::flow::{
    ScenarioOutcome, AMOUNT_SELECTOR, RECIPIENT_SELECTOR, SUBMIT_SELECTOR, SUCCESS_SELECTOR, TERMINAL_SELECTOR,
};
use crate::intercept::RouteAction;
use crate::navigation::NavigationTarget;
use crate::scenario::Scenario;

/// Prefix of the line carrying the script's JSON report
pub const OUTCOME_MARKER: &str = "__TRANSFER_E2E_OUTCOME__";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,

    /// Where a screenshot is saved when the terminal wait times out
    pub screenshot_dir: Option<PathBuf>,

    /// Node executable running the generated script
    pub node_binary: String,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            screenshot_dir: None,
            node_binary: "node".to_string(),
        }
    }
}

/// What the script prints after [`OUTCOME_MARKER`]
#[derive(Debug, Deserialize)]
struct ScriptReport {
    #[serde(default)]
    outcome: ScenarioOutcome,
    #[serde(default)]
    error: Option<String>,
}

/// Runs scenarios in a real browser
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
}

impl PlaywrightDriver {
    /// Create a new driver, failing early when Playwright is missing
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;

        if let Some(dir) = &config.screenshot_dir {
            std::fs::create_dir_all(dir)?;
        }

        Ok(Self { config })
    }

    fn check_playwright_installed() -> E2eResult<()> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// Drive one scenario in a fresh browser context
    pub async fn run(
        &self,
        scenario: &Scenario,
        target: &NavigationTarget,
        timing: &Timing,
    ) -> E2eResult<ScenarioOutcome> {
        let script = build_script(&self.config, scenario, target.url()?.as_str(), timing)?;

        // Inside the working directory so `require('playwright')` resolves
        // against the project's node_modules.
        let cwd = std::env::current_dir()?;
        let temp_dir = tempfile::Builder::new().prefix(".transfer-e2e-").tempdir_in(&cwd)?;
        let script_path = temp_dir.path().join("scenario.js");
        std::fs::write(&script_path, &script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let output = TokioCommand::new(&self.config.node_binary)
            .arg(&script_path)
            .current_dir(&cwd)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("Playwright stderr: {}", stderr.trim());
        }

        let report = parse_report(&stdout).ok_or_else(|| {
            E2eError::Playwright(format!(
                "Script produced no outcome (exit {:?}):\nstdout: {}\nstderr: {}",
                output.status.code(),
                stdout,
                stderr
            ))
        })??;

        if let Some(error) = report.error {
            return Err(E2eError::Playwright(error));
        }
        if !output.status.success() {
            warn!("Playwright script exited with {:?}", output.status.code());
        }
        Ok(report.outcome)
    }
}

fn parse_report(stdout: &str) -> Option<E2eResult<ScriptReport>> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(OUTCOME_MARKER))
        .map(|json| serde_json::from_str(json).map_err(E2eError::from))
}

/// Render the Node script driving `scenario` against `url`
pub fn build_script(
    config: &PlaywrightConfig,
    scenario: &Scenario,
    url: &str,
    timing: &Timing,
) -> E2eResult<String> {
    let route = match scenario.fixture.action()? {
        Some(action) => format!(
            "  await page.route({pattern}, async (route) => {{\n    capture(route.request());\n    {answer}\n  }});\n",
            pattern = js(&scenario.route)?,
            answer = route_answer(&action)?,
        ),
        // Nothing may reach the network: every subresource request is held
        // unanswered, so the page waits just like an unrouted simulated fetch.
        None => "  await page.route('**/*', (route) => {\n    if (route.request().isNavigationRequest()) return route.continue();\n  });\n".to_string(),
    };

    let screenshot = match &config.screenshot_dir {
        Some(dir) => format!(
            "await page.screenshot({{ path: {}, fullPage: true }});",
            js(dir.join(format!("{}.png", scenario.name)).to_string_lossy().as_ref())?
        ),
        None => String::new(),
    };

    Ok(format!(
        r#"const {{ {browser} }} = require('playwright');

const report = {{ outcome: {{ terminal: 'none', terminal_text: null, captured: [], console: [], timed_out: false, timeout_ms: {wait_ms}, steps: [] }} }};

function capture(request) {{
  const postData = request.postData();
  let body = null;
  try {{ body = postData === null ? null : JSON.parse(postData); }} catch (_) {{ body = null; }}
  report.outcome.captured.push({{
    method: request.method(),
    url: request.url(),
    headers: request.headers(),
    post_data: postData,
    body,
  }});
}}

async function step(name, action) {{
  const started = Date.now();
  try {{
    const value = await action();
    report.outcome.steps.push({{ name, success: true, duration_ms: Date.now() - started }});
    return value;
  }} catch (error) {{
    report.outcome.steps.push({{ name, success: false, duration_ms: Date.now() - started, error: error.message }});
    throw error;
  }}
}}

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext();
  const page = await context.newPage();
  page.on('console', (msg) => report.outcome.console.push({{ severity: msg.type(), text: msg.text() }}));

{route}
  try {{
    await step({navigate}, () => page.goto({url}));
    await step('wait:load', () => page.waitForLoadState('load'));
    await step({fill_recipient}, () => page.fill({recipient_selector}, {recipient}));
    await step({fill_amount}, () => page.fill({amount_selector}, {amount}));
    await step({click}, () => page.click({submit_selector}));

    try {{
      await step({wait}, () => page.waitForSelector({terminal_selector}, {{ timeout: {wait_ms} }}));
      const success = await page.locator({success_selector}).count();
      report.outcome.terminal = success > 0 ? 'success' : 'error';
      report.outcome.terminal_text = await page.locator({terminal_selector}).first().textContent();
    }} catch (error) {{
      if (error.name !== 'TimeoutError') throw error;
      report.outcome.timed_out = true;
      {screenshot}
    }}

    await step('settle', () => page.waitForTimeout({settle_ms}));
  }} catch (error) {{
    report.error = error.message;
  }} finally {{
    await browser.close();
  }}
  console.log({marker} + JSON.stringify(report));
}})();
"#,
        browser = config.browser.as_str(),
        headless = config.headless,
        wait_ms = timing.wait_timeout_ms,
        settle_ms = timing.settle_delay_ms,
        route = route,
        navigate = js(&format!("navigate:{}", url))?,
        url = js(url)?,
        fill_recipient = js(&format!("fill:{}", RECIPIENT_SELECTOR))?,
        fill_amount = js(&format!("fill:{}", AMOUNT_SELECTOR))?,
        recipient_selector = js(RECIPIENT_SELECTOR)?,
        amount_selector = js(AMOUNT_SELECTOR)?,
        recipient = js(&scenario.recipient)?,
        amount = js(&scenario.amount)?,
        click = js(&format!("click:{}", SUBMIT_SELECTOR))?,
        submit_selector = js(SUBMIT_SELECTOR)?,
        wait = js(&format!("wait:{}", TERMINAL_SELECTOR))?,
        terminal_selector = js(TERMINAL_SELECTOR)?,
        success_selector = js(SUCCESS_SELECTOR)?,
        screenshot = screenshot,
        marker = js(OUTCOME_MARKER)?,
    ))
}

fn js(value: &str) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

fn route_answer(action: &RouteAction) -> serde_json::Result<String> {
    Ok(match action {
        RouteAction::Fulfill(response) => format!(
            "await route.fulfill({{ status: {}, contentType: {}, body: {} }});",
            response.status,
            serde_json::to_string(&response.content_type)?,
            serde_json::to_string(&response.body)?,
        ),
        RouteAction::Abort(reason) => {
            format!("await route.abort({});", serde_json::to_string(reason.as_str())?)
        }
    })
}
