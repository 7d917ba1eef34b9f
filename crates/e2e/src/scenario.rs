//! Scenario definitions
//!
//! A scenario names the fixture the endpoint answers with, the literals typed
//! into the form, and what the page must show and send. Scenarios load from
//! YAML, one per file:
//!
//! ```yaml
//! name: transfer-rejected
//! tags: [smoke, error]
//! fixture:
//!   kind: rejected
//!   error: Insufficient funds
//! recipient: jane.smith@example.com
//! amount: "5000.00"
//! expect:
//!   terminal: error
//!   text_contains: ["Error: Insufficient funds"]
//!   console: transfer.failure
//! ```

use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::console::EventKind;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{Fixture, TRANSFER_ROUTE};
use crate::flow::{ScenarioOutcome, TerminalState};

/// One end-to-end scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Glob the fixture's rule is registered under
    #[serde(default = "default_route")]
    pub route: String,

    pub fixture: Fixture,

    /// Literal typed into `#recipient`
    pub recipient: String,

    /// Literal typed into `#amount`, kept as text so `"100.50"` stays as typed
    #[serde(deserialize_with = "literal")]
    pub amount: String,

    #[serde(default)]
    pub expect: Expectations,
}

fn default_route() -> String {
    TRANSFER_ROUTE.to_string()
}

/// Accept a quoted or bare scalar as form input text
/// Only a YAML string is taken: a bare `100.50` is already the number 100.5
/// and could not be typed back the way it was written.
fn literal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(text) => Ok(text),
        _ => Err(D::Error::custom(
            "amount must be a quoted string so it is typed verbatim, e.g. amount: \"100.50\"",
        )),
    }
}

/// What the scenario must observe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Expectations {
    pub terminal: TerminalState,

    /// Substrings the terminal text must contain
    pub text_contains: Vec<String>,

    /// Event kind at least one console record must carry
    pub console: Option<EventKind>,

    pub request: Option<RequestExpectation>,
}

/// Checks on the intercepted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestExpectation {
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub recipient: Option<String>,

    /// Must decode as a JSON number equal to this
    #[serde(default)]
    pub amount: Option<f64>,

    /// Substring of the `content-type` header
    #[serde(default)]
    pub content_type: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl Default for RequestExpectation {
    fn default() -> Self {
        Self {
            method: default_method(),
            recipient: None,
            amount: None,
            content_type: None,
        }
    }
}

impl Expectations {
    /// Check an outcome against these expectations, first mismatch wins
    pub fn verify(&self, outcome: &ScenarioOutcome) -> E2eResult<()> {
        if outcome.timed_out && self.terminal != TerminalState::None {
            return Err(E2eError::Timeout {
                what: format!("{} message", self.terminal_label()),
                timeout_ms: outcome.timeout_ms,
            });
        }

        if outcome.terminal != self.terminal {
            return Err(E2eError::AssertionFailed(format!(
                "expected terminal state {:?}, page shows {:?} ({:?})",
                self.terminal,
                outcome.terminal,
                outcome.terminal_text.as_deref().unwrap_or("")
            )));
        }

        let text = outcome.terminal_text.as_deref().unwrap_or("");
        for needle in &self.text_contains {
            if !text.contains(needle.as_str()) {
                return Err(E2eError::AssertionFailed(format!(
                    "terminal text {:?} does not contain {:?}",
                    text, needle
                )));
            }
        }

        if let Some(kind) = self.console {
            if !outcome.console.iter().any(|r| r.kind() == Some(kind)) {
                let seen: Vec<String> = outcome.console.iter().map(|r| r.message()).collect();
                return Err(E2eError::AssertionFailed(format!(
                    "no {} console record among {:?}",
                    kind, seen
                )));
            }
        }

        if let Some(expected) = &self.request {
            expected.verify(outcome)?;
        }

        Ok(())
    }

    fn terminal_label(&self) -> &'static str {
        match self.terminal {
            TerminalState::Success => "success",
            TerminalState::Error => "error",
            TerminalState::None => "no",
        }
    }
}

impl RequestExpectation {
    fn verify(&self, outcome: &ScenarioOutcome) -> E2eResult<()> {
        let request = outcome
            .last_request()
            .ok_or_else(|| E2eError::AssertionFailed("no request was intercepted".to_string()))?;

        if !request.method.eq_ignore_ascii_case(&self.method) {
            return Err(E2eError::AssertionFailed(format!(
                "request method {}, expected {}",
                request.method, self.method
            )));
        }

        if let Some(content_type) = &self.content_type {
            let actual = request.header("content-type").unwrap_or("");
            if !actual.contains(content_type.as_str()) {
                return Err(E2eError::AssertionFailed(format!(
                    "content-type {:?} does not contain {:?}",
                    actual, content_type
                )));
            }
        }

        if self.recipient.is_none() && self.amount.is_none() {
            return Ok(());
        }
        let body = request
            .body
            .as_ref()
            .ok_or_else(|| E2eError::AssertionFailed("request body is not JSON".to_string()))?;

        if let Some(recipient) = &self.recipient {
            if body.get("recipient").and_then(|v| v.as_str()) != Some(recipient.as_str()) {
                return Err(E2eError::AssertionFailed(format!(
                    "request recipient {}, expected {:?}",
                    body.get("recipient").map(|v| v.to_string()).unwrap_or_default(),
                    recipient
                )));
            }
        }

        if let Some(amount) = self.amount {
            match body.get("amount") {
                Some(value) if value.is_number() && value.as_f64() == Some(amount) => {}
                other => {
                    return Err(E2eError::AssertionFailed(format!(
                        "request amount {}, expected number {}",
                        other.map(|v| v.to_string()).unwrap_or_else(|| "missing".to_string()),
                        amount
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Scenario {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Every `*.yaml`/`*.yml` under `dir`, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(E2eError::Config(format!(
                "scenario directory {} does not exist",
                dir.display()
            )));
        }

        let mut scenarios = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            debug!("Loading scenario {}", entry.path().display());
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }

    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name is empty".to_string()));
        }
        if self.route.trim().is_empty() {
            return Err(E2eError::SpecParse(format!("{}: route is empty", self.name)));
        }
        Ok(())
    }
}

/// The four reference scenarios
pub fn builtin_suite() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "transfer-success".to_string(),
            description: Some("Successful transfer shows the transaction id".to_string()),
            tags: vec!["smoke".to_string(), "success".to_string()],
            route: default_route(),
            fixture: Fixture::success("12345"),
            recipient: "john.doe@example.com".to_string(),
            amount: "100.50".to_string(),
            expect: Expectations {
                terminal: TerminalState::Success,
                text_contains: vec!["Success!".to_string(), "12345".to_string()],
                console: Some(EventKind::TransferSuccess),
                request: None,
            },
        },
        Scenario {
            name: "transfer-rejected".to_string(),
            description: Some("Application error is shown to the user".to_string()),
            tags: vec!["smoke".to_string(), "error".to_string()],
            route: default_route(),
            fixture: Fixture::rejected("Insufficient funds"),
            recipient: "jane.smith@example.com".to_string(),
            amount: "5000.00".to_string(),
            expect: Expectations {
                terminal: TerminalState::Error,
                text_contains: vec!["Error: Insufficient funds".to_string()],
                console: Some(EventKind::TransferFailure),
                request: None,
            },
        },
        Scenario {
            name: "transfer-payload".to_string(),
            description: Some("Request carries a JSON body with a numeric amount".to_string()),
            tags: vec!["payload".to_string()],
            route: default_route(),
            fixture: Fixture::success("99999"),
            recipient: "test@example.com".to_string(),
            amount: "250.75".to_string(),
            expect: Expectations {
                terminal: TerminalState::Success,
                text_contains: vec!["99999".to_string()],
                console: Some(EventKind::TransferSuccess),
                request: Some(RequestExpectation {
                    method: default_method(),
                    recipient: Some("test@example.com".to_string()),
                    amount: Some(250.75),
                    content_type: Some("application/json".to_string()),
                }),
            },
        },
        Scenario {
            name: "transfer-network-failure".to_string(),
            description: Some("Aborted request surfaces a network error".to_string()),
            tags: vec!["error".to_string(), "network".to_string()],
            route: default_route(),
            fixture: Fixture::transport_failure(),
            recipient: "timeout@example.com".to_string(),
            amount: "100".to_string(),
            expect: Expectations {
                terminal: TerminalState::Error,
                text_contains: vec!["Network error".to_string()],
                console: Some(EventKind::TransferFailure),
                request: None,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{ConsoleRecord, Severity};
    use crate::intercept::{AbortReason, CapturedRequest};
    use serde_json::json;
    use std::collections::BTreeMap;
    use test_case::test_case;

    fn payload_request(body: serde_json::Value) -> CapturedRequest {
        CapturedRequest {
            method: "POST".to_string(),
            url: "http://127.0.0.1:3000/api/transfer".to_string(),
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            post_data: Some(body.to_string()),
            body: Some(body),
        }
    }

    fn success_outcome(text: &str) -> ScenarioOutcome {
        ScenarioOutcome {
            terminal: TerminalState::Success,
            terminal_text: Some(text.to_string()),
            console: vec![ConsoleRecord::new(Severity::Log, "✅ Transfer successful")],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_yaml_scenario() {
        let scenario = Scenario::from_yaml(
            r#"
name: transfer-network-failure
tags: [network]
fixture:
  kind: transport_failure
  reason: connectionrefused
recipient: timeout@example.com
amount: "100"
expect:
  terminal: error
  text_contains: ["Network error"]
  console: transfer.failure
"#,
        )
        .unwrap();

        assert_eq!(scenario.route, TRANSFER_ROUTE);
        assert_eq!(scenario.amount, "100");
        assert_eq!(
            scenario.fixture,
            Fixture::TransportFailure {
                reason: AbortReason::ConnectionRefused
            }
        );
        assert_eq!(scenario.expect.terminal, TerminalState::Error);
        assert_eq!(scenario.expect.console, Some(EventKind::TransferFailure));
    }

    #[test]
    fn test_quoted_amount_is_kept_verbatim() {
        let scenario = Scenario::from_yaml(
            "name: a\nfixture: {kind: success, transaction_id: '1'}\nrecipient: r\namount: \"100.50\"\n",
        )
        .unwrap();
        assert_eq!(scenario.amount, "100.50");
        assert_eq!(scenario.expect, Expectations::default());
    }

    #[test_case("100.50" ; "float")]
    #[test_case("100" ; "integer")]
    #[test_case("true" ; "boolean")]
    fn test_unquoted_amount_is_rejected(amount: &str) {
        let yaml = format!("name: a\nfixture: {{kind: none}}\nrecipient: r\namount: {}\n", amount);
        let err = Scenario::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, E2eError::Yaml(_)), "{err}");
        assert!(err.to_string().contains("quoted string"), "{err}");
    }

    #[test]
    fn test_unquoted_amount_in_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.yaml");
        std::fs::write(&path, "name: a\nfixture: {kind: none}\nrecipient: r\namount: 100.50\n").unwrap();

        let err = Scenario::from_file(&path).unwrap_err();
        assert!(matches!(&err, E2eError::SpecParse(msg) if msg.contains("float.yaml")), "{err}");
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let err = Scenario::from_yaml("name: ''\nfixture: {kind: none}\nrecipient: r\namount: '1'\n").unwrap_err();
        assert!(matches!(err, E2eError::SpecParse(_)));
    }

    #[test]
    fn test_unknown_fixture_kind_is_yaml_error() {
        let err = Scenario::from_yaml("name: a\nfixture: {kind: teapot}\nrecipient: r\namount: '1'\n").unwrap_err();
        assert!(matches!(err, E2eError::Yaml(_)));
    }

    #[test]
    fn test_builtin_suite_shape() {
        let suite = builtin_suite();
        let names: Vec<&str> = suite.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["transfer-success", "transfer-rejected", "transfer-payload", "transfer-network-failure"]
        );
        assert_eq!(Scenario::filter_by_tag(&suite, "smoke").len(), 2);
        assert_eq!(Scenario::filter_by_tag(&suite, "network")[0].recipient, "timeout@example.com");
    }

    #[test]
    fn test_verify_success() {
        let expect = &builtin_suite()[0].expect;
        expect.verify(&success_outcome("Success! Transaction ID: 12345")).unwrap();

        let err = expect.verify(&success_outcome("Success! Transaction ID: 54321")).unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(msg) if msg.contains("12345")));
    }

    #[test]
    fn test_verify_wrong_terminal_state() {
        let expect = &builtin_suite()[1].expect;
        let err = expect.verify(&success_outcome("Success! Transaction ID: 1")).unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(_)));
    }

    #[test]
    fn test_verify_timeout() {
        let outcome = ScenarioOutcome {
            timed_out: true,
            timeout_ms: 10_000,
            ..Default::default()
        };
        let err = builtin_suite()[0].expect.verify(&outcome).unwrap_err();
        assert!(matches!(err, E2eError::Timeout { timeout_ms: 10_000, .. }));

        // Scenarios that expect no terminal message accept the timeout.
        Expectations::default().verify(&outcome).unwrap();
    }

    #[test]
    fn test_verify_missing_console_event() {
        let mut outcome = success_outcome("Success! Transaction ID: 12345");
        outcome.console = vec![ConsoleRecord::new(Severity::Log, "page loaded")];
        let err = builtin_suite()[0].expect.verify(&outcome).unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(msg) if msg.contains("transfer.success")));
    }

    #[test]
    fn test_verify_request_payload() {
        let expect = &builtin_suite()[2].expect;
        let mut outcome = success_outcome("Success! Transaction ID: 99999");

        outcome.captured = vec![payload_request(json!({"recipient": "test@example.com", "amount": 250.75}))];
        expect.verify(&outcome).unwrap();

        outcome.captured = vec![payload_request(json!({"recipient": "test@example.com", "amount": "250.75"}))];
        let err = expect.verify(&outcome).unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(msg) if msg.contains("amount")));

        outcome.captured.clear();
        assert!(expect.verify(&outcome).is_err());
    }
}
