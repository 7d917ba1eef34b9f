//! Suite configuration

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use transfer_host::{HostConfig, DEFAULT_DOCUMENT, DEFAULT_PORT};

use crate::error::{E2eError, E2eResult};
use crate::navigation::NavigationMode;
use crate::playwright::PlaywrightConfig;

/// Which browser drives the scenarios
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// In-process page model, no browser needed
    #[default]
    Simulated,
    /// Real browser through a generated Playwright script
    Playwright,
}

/// Wait bounds for a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Bound on waiting for the terminal message
    pub wait_timeout_ms: u64,

    /// Pause before console records are read
    pub settle_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 10_000,
            settle_delay_ms: 500,
        }
    }
}

impl Timing {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Content host settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub bind: IpAddr,
    pub port: u16,
    pub document: PathBuf,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            document: PathBuf::from(DEFAULT_DOCUMENT),
        }
    }
}

impl HostSettings {
    pub fn to_host_config(&self) -> HostConfig {
        HostConfig {
            bind: self.bind,
            port: self.port,
            document: self.document.clone(),
        }
    }
}

/// Configuration for a suite run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub host: HostSettings,
    pub navigation: NavigationMode,
    pub driver: DriverKind,
    pub timing: Timing,
    pub playwright: PlaywrightConfig,

    /// Directory of YAML scenarios; the built-in suite runs when unset
    pub scenarios_dir: Option<PathBuf>,

    /// Where `test-results.json` is written
    pub output_dir: PathBuf,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            host: HostSettings::default(),
            navigation: NavigationMode::default(),
            driver: DriverKind::default(),
            timing: Timing::default(),
            playwright: PlaywrightConfig::default(),
            scenarios_dir: None,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

impl SuiteConfig {
    pub fn from_toml(text: &str) -> E2eResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.timing.wait_timeout_ms == 0 {
            return Err(E2eError::Config("timing.wait_timeout_ms must be positive".to_string()));
        }
        if self.host.document.as_os_str().is_empty() {
            return Err(E2eError::Config("host.document must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = SuiteConfig::default();
        assert_eq!(config.host.port, 3000);
        assert_eq!(config.timing.wait_timeout(), Duration::from_secs(10));
        assert_eq!(config.timing.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.navigation, NavigationMode::Served);
        assert_eq!(config.driver, DriverKind::Simulated);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = SuiteConfig::from_toml(
            r#"
navigation = "local_file"
driver = "playwright"
output_dir = "out"

[host]
port = 3100

[timing]
wait_timeout_ms = 2000

[playwright]
browser = "firefox"
headless = false
"#,
        )
        .unwrap();

        assert_eq!(config.host.port, 3100);
        assert_eq!(config.host.bind, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.navigation, NavigationMode::LocalFile);
        assert_eq!(config.driver, DriverKind::Playwright);
        assert_eq!(config.timing.wait_timeout_ms, 2000);
        assert_eq!(config.timing.settle_delay_ms, 500);
        assert!(!config.playwright.headless);
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_zero_wait_timeout_is_rejected() {
        let err = SuiteConfig::from_toml("[timing]\nwait_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, E2eError::Config(_)));
    }

    #[test]
    fn test_unknown_driver_is_a_toml_error() {
        let err = SuiteConfig::from_toml("driver = \"selenium\"\n").unwrap_err();
        assert!(matches!(err, E2eError::Toml(_)));
    }
}
