//! Request interception - route rules, fabricated responses and captured requests
//!
//! A [`RouteTable`] belongs to exactly one page. Rules map a URL glob to a
//! responder; when the page issues a request the most recently registered
//! matching rule decides whether to fulfill it with a [`FabricatedResponse`]
//! or abort it with an [`AbortReason`]. Every dispatched request is recorded
//! as a [`CapturedRequest`] before the responder runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Glob pattern matched against the full request URL
///
/// `**` matches across `/`, `*` stops at `/`, `?` matches one character and
/// `{a,b}` matches either alternative. A leading `**/` may also match nothing.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn glob(pattern: &str) -> E2eResult<Self> {
        if pattern.trim().is_empty() {
            return Err(E2eError::Config("route pattern must not be empty".to_string()));
        }
        let regex = Regex::new(&glob_to_regex(pattern)?)
            .map_err(|e| E2eError::Config(format!("invalid route pattern {:?}: {}", pattern, e)))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

fn glob_to_regex(glob: &str) -> E2eResult<String> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2);
    let mut in_group = false;
    let mut i = 0;

    out.push('^');
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                let at_segment_start = i == 0 || chars[i - 1] == '/';
                let mut stars = 1;
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    stars += 1;
                    i += 1;
                }
                if stars == 1 {
                    out.push_str("[^/]*");
                } else if at_segment_start && chars.get(i + 1) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 1;
                } else {
                    out.push_str(".*");
                }
            }
            '?' => out.push('.'),
            '{' if !in_group => {
                in_group = true;
                out.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            _ => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
        i += 1;
    }
    out.push('$');

    if in_group {
        return Err(E2eError::Config(format!("unclosed '{{' in route pattern {:?}", glob)));
    }
    Ok(out)
}

/// A request as seen by a responder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: String,
    /// Header names are lower-case
    pub headers: BTreeMap<String, String>,
    pub post_data: Option<String>,
}

impl InterceptedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Post data decoded as JSON, if it is JSON
    pub fn post_data_json(&self) -> Option<Value> {
        self.post_data
            .as_deref()
            .and_then(|data| serde_json::from_str(data).ok())
    }
}

/// Snapshot of an intercepted request kept for assertions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub post_data: Option<String>,
    /// Decoded JSON body; `None` when absent or not JSON
    #[serde(default)]
    pub body: Option<Value>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl From<&InterceptedRequest> for CapturedRequest {
    fn from(request: &InterceptedRequest) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            post_data: request.post_data.clone(),
            body: request.post_data_json(),
        }
    }
}

/// A response produced without any backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricatedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl FabricatedResponse {
    /// JSON response; the body is always valid JSON
    pub fn json<T: Serialize>(status: u16, value: &T) -> E2eResult<Self> {
        Ok(Self {
            status,
            content_type: "application/json".to_string(),
            body: serde_json::to_string(value)?,
        })
    }

    pub fn text(status: u16, content_type: &str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            body: body.into(),
        }
    }

    /// Mirrors `Response.ok`
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why an aborted request failed. Names follow Playwright's `route.abort()`
/// error codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbortReason {
    Aborted,
    AccessDenied,
    AddressUnreachable,
    BlockedByClient,
    BlockedByResponse,
    ConnectionAborted,
    ConnectionClosed,
    ConnectionFailed,
    ConnectionRefused,
    ConnectionReset,
    InternetDisconnected,
    NameNotResolved,
    TimedOut,
    #[default]
    Failed,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::Aborted => "aborted",
            AbortReason::AccessDenied => "accessdenied",
            AbortReason::AddressUnreachable => "addressunreachable",
            AbortReason::BlockedByClient => "blockedbyclient",
            AbortReason::BlockedByResponse => "blockedbyresponse",
            AbortReason::ConnectionAborted => "connectionaborted",
            AbortReason::ConnectionClosed => "connectionclosed",
            AbortReason::ConnectionFailed => "connectionfailed",
            AbortReason::ConnectionRefused => "connectionrefused",
            AbortReason::ConnectionReset => "connectionreset",
            AbortReason::InternetDisconnected => "internetdisconnected",
            AbortReason::NameNotResolved => "namenotresolved",
            AbortReason::TimedOut => "timedout",
            AbortReason::Failed => "failed",
        }
    }

    /// Chromium network error the browser reports for this reason
    pub fn net_error(&self) -> &'static str {
        match self {
            AbortReason::Aborted => "net::ERR_ABORTED",
            AbortReason::AccessDenied => "net::ERR_ACCESS_DENIED",
            AbortReason::AddressUnreachable => "net::ERR_ADDRESS_UNREACHABLE",
            AbortReason::BlockedByClient => "net::ERR_BLOCKED_BY_CLIENT",
            AbortReason::BlockedByResponse => "net::ERR_BLOCKED_BY_RESPONSE",
            AbortReason::ConnectionAborted => "net::ERR_CONNECTION_ABORTED",
            AbortReason::ConnectionClosed => "net::ERR_CONNECTION_CLOSED",
            AbortReason::ConnectionFailed => "net::ERR_CONNECTION_FAILED",
            AbortReason::ConnectionRefused => "net::ERR_CONNECTION_REFUSED",
            AbortReason::ConnectionReset => "net::ERR_CONNECTION_RESET",
            AbortReason::InternetDisconnected => "net::ERR_INTERNET_DISCONNECTED",
            AbortReason::NameNotResolved => "net::ERR_NAME_NOT_RESOLVED",
            AbortReason::TimedOut => "net::ERR_TIMED_OUT",
            AbortReason::Failed => "net::ERR_FAILED",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a responder decided for one request
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    Fulfill(FabricatedResponse),
    Abort(AbortReason),
}

pub type Responder = Arc<dyn Fn(&InterceptedRequest) -> RouteAction + Send + Sync>;

/// A URL pattern bound to a responder
#[derive(Clone)]
pub struct InterceptRule {
    pattern: UrlPattern,
    responder: Responder,
}

impl InterceptRule {
    pub fn pattern(&self) -> &UrlPattern {
        &self.pattern
    }
}

impl fmt::Debug for InterceptRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptRule")
            .field("pattern", &self.pattern.source)
            .finish_non_exhaustive()
    }
}

/// Interception rules and captured requests for one page
#[derive(Debug, Default)]
pub struct RouteTable {
    rules: Mutex<Vec<InterceptRule>>,
    captured: Mutex<Vec<CapturedRequest>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a rule. Registering the same pattern again replaces the
    /// earlier rule.
    pub fn register<F>(&self, pattern: &str, responder: F) -> E2eResult<()>
    where
        F: Fn(&InterceptedRequest) -> RouteAction + Send + Sync + 'static,
    {
        let pattern = UrlPattern::glob(pattern)?;
        let mut rules = self.rules.lock();
        let before = rules.len();
        rules.retain(|rule| rule.pattern.source != pattern.source);
        if rules.len() != before {
            debug!("Replacing route {}", pattern.source);
        } else {
            debug!("Registering route {}", pattern.source);
        }
        rules.push(InterceptRule {
            pattern,
            responder: Arc::new(responder),
        });
        Ok(())
    }

    /// Remove the rule for `pattern`. Returns whether one existed.
    pub fn unregister(&self, pattern: &str) -> bool {
        let mut rules = self.rules.lock();
        let before = rules.len();
        rules.retain(|rule| rule.pattern.source != pattern);
        rules.len() != before
    }

    pub fn len(&self) -> usize {
        self.rules.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.lock().is_empty()
    }

    /// Route a request. `None` means no rule matched and the request is not
    /// intercepted.
    pub fn dispatch(&self, request: &InterceptedRequest) -> Option<RouteAction> {
        let responder = {
            let rules = self.rules.lock();
            rules
                .iter()
                .rev()
                .find(|rule| rule.pattern.matches(&request.url))
                .map(|rule| Arc::clone(&rule.responder))
        }?;

        self.captured.lock().push(CapturedRequest::from(request));
        debug!("Intercepted {} {}", request.method, request.url);

        Some(responder(request))
    }

    /// All captured requests in dispatch order
    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.captured.lock().clone()
    }

    pub fn last_captured(&self) -> Option<CapturedRequest> {
        self.captured.lock().last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn post(url: &str, body: &str) -> InterceptedRequest {
        InterceptedRequest {
            method: "POST".to_string(),
            url: url.to_string(),
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            post_data: Some(body.to_string()),
        }
    }

    fn ok(_: &InterceptedRequest) -> RouteAction {
        RouteAction::Fulfill(FabricatedResponse::text(200, "text/plain", "first"))
    }

    #[test_case("**/api/transfer", "http://localhost:3000/api/transfer", true ; "served url")]
    #[test_case("**/api/transfer", "file:///api/transfer", true ; "file url")]
    #[test_case("**/api/transfer", "http://localhost:3000/api/transfers", false ; "longer path")]
    #[test_case("**/api/transfer", "http://localhost:3000/api/transfer?x=1", false ; "query string")]
    #[test_case("**/api/*", "http://h/api/transfer", true ; "single star")]
    #[test_case("**/api/*", "http://h/api/v1/transfer", false ; "single star stops at slash")]
    #[test_case("**/api/**", "http://h/api/v1/transfer", true ; "double star crosses slash")]
    #[test_case("**/api/{transfer,balance}", "http://h/api/balance", true ; "alternatives")]
    #[test_case("http://h/api/transfe?", "http://h/api/transfer", true ; "question mark")]
    #[test_case("http://h/a.b", "http://h/axb", false ; "dot is literal")]
    fn test_glob_matching(pattern: &str, url: &str, expected: bool) {
        let pattern = UrlPattern::glob(pattern).unwrap();
        assert_eq!(pattern.matches(url), expected, "{} vs {}", pattern.source(), url);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("**/api/{transfer" ; "unclosed group")]
    fn test_invalid_patterns_are_config_errors(pattern: &str) {
        assert!(matches!(UrlPattern::glob(pattern), Err(E2eError::Config(_))));
    }

    #[test]
    fn test_last_registration_wins() {
        let table = RouteTable::new();
        table.register("**/api/transfer", ok).unwrap();
        table
            .register("**/api/transfer", |_| RouteAction::Abort(AbortReason::Failed))
            .unwrap();

        assert_eq!(table.len(), 1);
        let action = table.dispatch(&post("http://h/api/transfer", "{}"));
        assert_eq!(action, Some(RouteAction::Abort(AbortReason::Failed)));
    }

    #[test]
    fn test_unmatched_request_is_not_captured() {
        let table = RouteTable::new();
        table.register("**/api/transfer", ok).unwrap();

        assert!(table.dispatch(&post("http://h/api/balance", "{}")).is_none());
        assert!(table.captured().is_empty());
    }

    #[test]
    fn test_dispatch_captures_decoded_body() {
        let table = RouteTable::new();
        table.register("**/api/transfer", ok).unwrap();

        let body = r#"{"recipient":"test@example.com","amount":250.75}"#;
        table.dispatch(&post("http://h/api/transfer", body)).unwrap();

        let captured = table.last_captured().unwrap();
        assert_eq!(captured.method, "POST");
        assert_eq!(captured.header("Content-Type"), Some("application/json"));
        let decoded = captured.body.unwrap();
        assert_eq!(decoded["recipient"], "test@example.com");
        assert_eq!(decoded["amount"].as_f64(), Some(250.75));
    }

    #[test]
    fn test_non_json_post_data_keeps_raw_text() {
        let table = RouteTable::new();
        table.register("**", ok).unwrap();

        table.dispatch(&post("http://h/form", "a=1&b=2")).unwrap();
        let captured = table.last_captured().unwrap();
        assert_eq!(captured.post_data.as_deref(), Some("a=1&b=2"));
        assert!(captured.body.is_none());
    }

    #[test]
    fn test_unregister_removes_rule() {
        let table = RouteTable::new();
        table.register("**/api/transfer", ok).unwrap();
        assert!(table.unregister("**/api/transfer"));
        assert!(!table.unregister("**/api/transfer"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_json_response_is_valid_json() {
        let resp = FabricatedResponse::json(400, &serde_json::json!({ "error": "Insufficient funds" })).unwrap();
        assert_eq!(resp.content_type, "application/json");
        assert!(!resp.is_ok());
        let parsed: Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(parsed["error"], "Insufficient funds");
    }

    #[test]
    fn test_abort_reason_names() {
        assert_eq!(AbortReason::default(), AbortReason::Failed);
        assert_eq!(AbortReason::Failed.net_error(), "net::ERR_FAILED");
        let parsed: AbortReason = serde_json::from_str("\"timedout\"").unwrap();
        assert_eq!(parsed, AbortReason::TimedOut);
        assert_eq!(parsed.to_string(), "timedout");
    }
}
