//! End-to-end harness for the money-transfer page
//!
//! The page under test posts a transfer to `/api/transfer`. No backend
//! exists: every call is intercepted and answered with a fabricated
//! response, so each scenario is deterministic.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SuiteRunner                           │
//! │    ├── start_host() -> transfer_host::HostHandle            │
//! │    ├── run_scenario(Scenario) -> ScenarioResult             │
//! │    └── write_results(SuiteResult)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  flow::drive(page, NavigationTarget, Scenario, Timing)      │
//! │    route -> goto -> fill -> click -> wait -> settle         │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  Page (simulated)            │  PlaywrightDriver            │
//! │    RouteTable ── Fixture     │    generated Node script     │
//! │    ConsoleLog                │    JSON outcome line         │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  Scenario (YAML) ── Expectations::verify(ScenarioOutcome)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod console;
pub mod dom;
pub mod error;
pub mod fixtures;
pub mod flow;
pub mod intercept;
pub mod navigation;
pub mod page;
pub mod playwright;
pub mod runner;
pub mod scenario;

pub use config::{DriverKind, SuiteConfig, Timing};
pub use console::{ConsoleLog, ConsoleRecord, EventKind, Severity};
pub use error::{E2eError, E2eResult};
pub use fixtures::{Fixture, TRANSFER_ROUTE};
pub use flow::{ScenarioOutcome, TerminalState};
pub use intercept::{AbortReason, CapturedRequest, FabricatedResponse, InterceptedRequest, RouteAction, RouteTable};
pub use navigation::{NavigationMode, NavigationTarget};
pub use page::{Page, PageConfig};
pub use playwright::{Browser, PlaywrightConfig, PlaywrightDriver};
pub use runner::{ScenarioResult, SuiteResult, SuiteRunner};
pub use scenario::{builtin_suite, Expectations, Scenario};
