//! Suite runner that orchestrates the content host, the page driver and the
//! scenario expectations

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, Instrument};
use transfer_host::HostHandle;

use crate::config::{DriverKind, SuiteConfig};
use crate::error::{E2eError, E2eResult};
use crate::flow::{self, ScenarioOutcome, StepRecord};
use crate::navigation::{NavigationMode, NavigationTarget};
use crate::page::{Page, PageConfig};
use crate::playwright::PlaywrightDriver;
use crate::scenario::{builtin_suite, Scenario};

/// Result of running a single scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

/// Result of running a suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs scenarios one after another against one content host
pub struct SuiteRunner {
    config: SuiteConfig,

    /// Running host, served navigation only
    host: Option<HostHandle>,

    playwright: Option<PlaywrightDriver>,
}

impl SuiteRunner {
    pub fn new(config: SuiteConfig) -> Self {
        Self {
            config,
            host: None,
            playwright: None,
        }
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Base URL of the running host
    pub fn base_url(&self) -> Option<&str> {
        self.host.as_ref().map(HostHandle::base_url)
    }

    /// Start the content host. Does nothing when it already runs or when
    /// pages load from disk.
    pub async fn start_host(&mut self) -> E2eResult<()> {
        if self.host.is_some() || self.config.navigation == NavigationMode::LocalFile {
            return Ok(());
        }

        let host = HostHandle::start(&self.config.host.to_host_config()).await?;
        self.host = Some(host);
        Ok(())
    }

    /// Stop the host and release its port
    pub async fn stop_host(&mut self) -> E2eResult<()> {
        if let Some(host) = self.host.take() {
            host.stop().await?;
        }
        Ok(())
    }

    /// Scenarios from the configured directory, or the built-in suite
    pub fn load_scenarios(&self) -> E2eResult<Vec<Scenario>> {
        match &self.config.scenarios_dir {
            Some(dir) => Scenario::load_all(dir),
            None => Ok(builtin_suite()),
        }
    }

    pub async fn run_all(&mut self) -> E2eResult<SuiteResult> {
        let scenarios = self.load_scenarios()?;
        self.run_scenarios(&scenarios).await
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<SuiteResult> {
        let scenarios = self.load_scenarios()?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_scenarios(&filtered).await
    }

    /// Run one scenario by name
    pub async fn run_named(&mut self, name: &str) -> E2eResult<ScenarioResult> {
        let scenario = self
            .load_scenarios()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;

        self.run_scenario(&scenario).await
    }

    pub async fn run_scenarios(&mut self, scenarios: &[Scenario]) -> E2eResult<SuiteResult> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        self.start_host().await?;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(scenario).await?;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Scenario results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        Ok(SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Run one scenario on a fresh page. Failures inside the scenario are
    /// reported in the result; only host failures are returned as errors.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> E2eResult<ScenarioResult> {
        self.start_host().await?;
        let target = self.target()?;

        let span = info_span!("scenario", name = %scenario.name);
        let start = Instant::now();
        let driven = self.drive(scenario, &target).instrument(span.clone()).await;

        let (steps, error) = match driven {
            Ok(outcome) => {
                let verdict = span.in_scope(|| scenario.expect.verify(&outcome));
                (outcome.steps, verdict.err().map(|e| e.to_string()))
            }
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        Ok(ScenarioResult {
            name: scenario.name.clone(),
            success: error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            error,
        })
    }

    fn target(&self) -> E2eResult<NavigationTarget> {
        match self.config.navigation {
            NavigationMode::LocalFile => Ok(NavigationTarget::local_file(&self.config.host.document)),
            NavigationMode::Served => self
                .host
                .as_ref()
                .map(|host| NavigationTarget::served(host.base_url()))
                .ok_or_else(|| E2eError::Config("content host is not running".to_string())),
        }
    }

    async fn drive(&mut self, scenario: &Scenario, target: &NavigationTarget) -> E2eResult<ScenarioOutcome> {
        debug!("Running scenario {} against {:?}", scenario.name, target);
        let timing = self.config.timing;

        match self.config.driver {
            DriverKind::Simulated => {
                let mut page = Page::new(PageConfig::default())?;
                flow::drive(&mut page, target, scenario, &timing).await
            }
            DriverKind::Playwright => {
                if self.playwright.is_none() {
                    self.playwright = Some(PlaywrightDriver::new(self.config.playwright.clone())?);
                }
                match &self.playwright {
                    Some(driver) => driver.run(scenario, target, &timing).await,
                    None => Err(E2eError::PlaywrightNotFound),
                }
            }
        }
    }

    /// Write results to `<output_dir>/test-results.json`
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
