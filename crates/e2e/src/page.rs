//! Simulated browser page
//!
//! A deterministic, in-process stand-in for a browser tab showing the
//! transfer page. It loads the document over HTTP or from disk, keeps form
//! field values, and on submit runs the page's script logic in Rust: build the
//! JSON request, send it through the page's [`RouteTable`], then render the
//! terminal message and log to the console exactly as the page does.
//!
//! Requests that no rule intercepts never complete, so a scenario without a
//! rule waits until its DOM wait times out.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::console::{ConsoleLog, ConsoleRecord, Severity};
use crate::dom::{Document, MessageKind, Selector};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::TransferRequest;
use crate::intercept::{CapturedRequest, InterceptedRequest, RouteAction, RouteTable};

const RECIPIENT_FIELD: &str = "recipient";
const AMOUNT_FIELD: &str = "amount";

/// Message the browser gives a rejected `fetch()`
const FETCH_FAILED: &str = "Failed to fetch";

/// Tuning for the simulated page
#[derive(Debug, Clone)]
pub struct PageConfig {
    /// How often bounded waits re-check the DOM
    pub poll_interval: Duration,

    /// Timeout for loading the document over HTTP
    pub navigation_timeout: Duration,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RenderedMessage {
    kind: MessageKind,
    text: String,
}

#[derive(Debug, Default)]
struct PageState {
    message: Option<RenderedMessage>,
    pending_requests: usize,
}

/// One page in its own browsing context
pub struct Page {
    config: PageConfig,
    client: reqwest::Client,
    routes: Arc<RouteTable>,
    console: ConsoleLog,
    state: Arc<Mutex<PageState>>,
    url: Option<Url>,
    document: Option<Document>,
    values: HashMap<String, String>,
    tasks: Vec<JoinHandle<()>>,
}

impl Page {
    pub fn new(config: PageConfig) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.navigation_timeout)
            .build()?;

        Ok(Self {
            config,
            client,
            routes: Arc::new(RouteTable::new()),
            console: ConsoleLog::new(),
            state: Arc::new(Mutex::new(PageState::default())),
            url: None,
            document: None,
            values: HashMap::new(),
            tasks: Vec::new(),
        })
    }

    /// Install an interception rule. Rules must be in place before the first
    /// navigation so none of the page's requests can slip past them.
    pub fn route<F>(&self, pattern: &str, responder: F) -> E2eResult<()>
    where
        F: Fn(&InterceptedRequest) -> RouteAction + Send + Sync + 'static,
    {
        if let Some(url) = &self.url {
            return Err(E2eError::Config(format!(
                "route {} registered after navigation to {}",
                pattern, url
            )));
        }
        self.routes.register(pattern, responder)
    }

    /// Navigate to an `http(s)://` or `file://` URL
    pub async fn goto(&mut self, url: &str) -> E2eResult<()> {
        debug!("Navigating to {}", url);
        let parsed = Url::parse(url).map_err(|e| navigation_error(url, e))?;

        let html = match parsed.scheme() {
            "http" | "https" => {
                let response = self
                    .client
                    .get(parsed.clone())
                    .send()
                    .await
                    .map_err(|e| navigation_error(url, e))?;
                if !response.status().is_success() {
                    warn!("{} answered {}", url, response.status());
                }
                response.text().await.map_err(|e| navigation_error(url, e))?
            }
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|()| navigation_error(url, "not a local file path"))?;
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| navigation_error(url, e))?
            }
            other => return Err(navigation_error(url, format!("unsupported URL scheme {}", other))),
        };

        self.abort_tasks();
        let document = Document::parse(&html);
        self.values = document
            .inputs()
            .iter()
            .map(|input| (input.id.clone(), input.value.clone()))
            .collect();
        self.document = Some(document);
        *self.state.lock() = PageState::default();
        self.url = Some(parsed);
        Ok(())
    }

    /// Resolves once a document is loaded
    pub async fn wait_for_load(&self) -> E2eResult<()> {
        match (&self.url, &self.document) {
            (Some(_), Some(_)) => Ok(()),
            _ => Err(E2eError::Navigation {
                url: "about:blank".to_string(),
                reason: "no document loaded".to_string(),
            }),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_ref().map(Url::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.document.as_ref().and_then(Document::title)
    }

    /// Set an input's value the way a user would type it
    pub fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        let id = self.input_id(selector)?;
        let numeric = self
            .loaded()?
            .input(&id)
            .map(|input| input.is_numeric())
            .unwrap_or(false);

        // Number inputs sanitize anything that is not a valid number to "".
        let value = if numeric && parse_number(value).is_none() {
            debug!("Value {:?} is not a valid number for #{}", value, id);
            String::new()
        } else {
            value.to_string()
        };
        self.values.insert(id, value);
        Ok(())
    }

    pub fn input_value(&self, selector: &str) -> E2eResult<String> {
        let id = self.input_id(selector)?;
        Ok(self.values.get(&id).cloned().unwrap_or_default())
    }

    /// Click an element. Clicking the submit button submits the form.
    pub fn click(&mut self, selector: &str) -> E2eResult<()> {
        match Selector::parse(selector)? {
            Selector::SubmitButton => {
                if self.loaded()?.submit_label().is_none() {
                    return Err(E2eError::SelectorNotFound(selector.to_string()));
                }
                self.submit()
            }
            parsed => {
                if self.matches(&parsed)? {
                    Ok(())
                } else {
                    Err(E2eError::SelectorNotFound(selector.to_string()))
                }
            }
        }
    }

    /// Whether an element matching `selector` is currently shown
    pub fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        self.matches(&Selector::parse(selector)?)
    }

    /// Bounded poll until `selector` matches
    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        let parsed = Selector::parse(selector)?;
        let deadline = Instant::now() + timeout;

        loop {
            if self.matches(&parsed)? {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(E2eError::Timeout {
                    what: format!("selector {}", selector),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// Text of the first element matching `selector`, `None` if nothing matches
    pub fn text_content(&self, selector: &str) -> E2eResult<Option<String>> {
        let parsed = Selector::parse(selector)?;
        let doc = self.loaded()?;
        let state = self.state.lock();
        Ok(text_of(&parsed, doc, &state))
    }

    /// Fixed pause
    pub async fn wait_for_timeout(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Handle to this page's console output
    pub fn console(&self) -> ConsoleLog {
        self.console.clone()
    }

    /// Requests intercepted so far, in order
    pub fn captured_requests(&self) -> Vec<CapturedRequest> {
        self.routes.captured()
    }

    /// Requests sent but not yet answered
    pub fn pending_requests(&self) -> usize {
        self.state.lock().pending_requests
    }

    fn loaded(&self) -> E2eResult<&Document> {
        self.document.as_ref().ok_or_else(|| E2eError::Navigation {
            url: "about:blank".to_string(),
            reason: "page has not navigated yet".to_string(),
        })
    }

    fn input_id(&self, selector: &str) -> E2eResult<String> {
        match Selector::parse(selector)? {
            Selector::Id(id) if self.loaded()?.input(&id).is_some() => Ok(id),
            Selector::Id(_) => Err(E2eError::SelectorNotFound(selector.to_string())),
            _ => Err(E2eError::Config(format!("{} does not select an input", selector))),
        }
    }

    fn matches(&self, selector: &Selector) -> E2eResult<bool> {
        let doc = self.loaded()?;
        let state = self.state.lock();
        Ok(text_of(selector, doc, &state).is_some())
    }

    fn field(&self, id: &str) -> &str {
        self.values.get(id).map(String::as_str).unwrap_or("")
    }

    /// The page script's submit handler
    fn submit(&mut self) -> E2eResult<()> {
        let doc = self.loaded()?;
        let endpoint = doc
            .endpoint()
            .ok_or_else(|| E2eError::SelectorNotFound("form".to_string()))?
            .to_string();
        let target = match &self.url {
            Some(page_url) => endpoint_url(page_url, &endpoint)?,
            None => return Err(navigation_error("about:blank", "page has not navigated yet")),
        };

        // Without `novalidate` the browser checks `required` itself and never
        // fires the submit event when a field is empty.
        if !doc.novalidate() {
            let blocked = doc
                .inputs()
                .iter()
                .find(|input| input.required && self.field(&input.id).trim().is_empty());
            if let Some(input) = blocked {
                debug!("Browser validation blocked submission at #{}", input.id);
                return Ok(());
            }
        }

        let recipient = self.field(RECIPIENT_FIELD).trim().to_string();
        let amount = parse_number(self.field(AMOUNT_FIELD));
        let (recipient, amount) = match (recipient.is_empty(), amount) {
            (false, Some(amount)) => (recipient, amount),
            _ => {
                debug!("Form constraint validation blocked submission");
                self.console.push(ConsoleRecord::structured(
                    Severity::Warning,
                    "transfer.invalid",
                    "Transfer form is incomplete",
                    Map::new(),
                ));
                return Ok(());
            }
        };

        self.state.lock().message = None;
        self.console.push(ConsoleRecord::structured(
            Severity::Info,
            "transfer.submit",
            "Submitting transfer",
            detail([
                ("recipient", Value::from(recipient.clone())),
                ("amount", Value::from(amount)),
            ]),
        ));

        let body = serde_json::to_string(&TransferRequest { recipient, amount })?;
        let request = InterceptedRequest {
            method: "POST".to_string(),
            url: target.into(),
            headers: BTreeMap::from([
                ("accept".to_string(), "*/*".to_string()),
                ("content-type".to_string(), "application/json".to_string()),
            ]),
            post_data: Some(body),
        };

        self.state.lock().pending_requests += 1;
        let routes = Arc::clone(&self.routes);
        let state = Arc::clone(&self.state);
        let console = self.console.clone();

        self.tasks.push(tokio::spawn(async move {
            // The request leaves the page asynchronously.
            tokio::task::yield_now().await;

            let Some(action) = routes.dispatch(&request) else {
                debug!("No route matched {} {}; request stays pending", request.method, request.url);
                return;
            };
            let rendered = settle_response(action, &console);
            let mut state = state.lock();
            state.pending_requests = state.pending_requests.saturating_sub(1);
            state.message = Some(rendered);
        }));

        Ok(())
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Apply the page's response handling to an interception outcome
fn settle_response(action: RouteAction, console: &ConsoleLog) -> RenderedMessage {
    let response = match action {
        RouteAction::Abort(reason) => {
            return network_error(FETCH_FAILED, reason.net_error(), console);
        }
        RouteAction::Fulfill(response) => response,
    };

    let data: Value = match serde_json::from_str(&response.body) {
        Ok(data) => data,
        Err(e) => {
            let reason = format!("Unexpected response body: {}", e);
            return network_error(&reason, "invalid JSON", console);
        }
    };

    if response.is_ok() {
        let transaction_id = js_display(data.get("transactionId"));
        console.push(ConsoleRecord::structured(
            Severity::Log,
            "transfer.success",
            "✅ Transfer successful",
            detail([("transactionId", Value::from(transaction_id.clone()))]),
        ));
        RenderedMessage {
            kind: MessageKind::Success,
            text: format!("Success! Transaction ID: {}", transaction_id),
        }
    } else {
        let reason = error_reason(data.get("error"));
        console.push(ConsoleRecord::structured(
            Severity::Error,
            "transfer.failure",
            "❌ Transfer failed",
            detail([
                ("status", Value::from(response.status)),
                ("error", Value::from(reason.clone())),
            ]),
        ));
        RenderedMessage {
            kind: MessageKind::Error,
            text: format!("Error: {}", reason),
        }
    }
}

fn network_error(reason: &str, cause: &str, console: &ConsoleLog) -> RenderedMessage {
    console.push(ConsoleRecord::structured(
        Severity::Error,
        "transfer.failure",
        "❌ Transfer failed",
        detail([
            ("reason", Value::from("network")),
            ("detail", Value::from(format!("{} ({})", reason, cause))),
        ]),
    ));
    RenderedMessage {
        kind: MessageKind::Error,
        text: format!("Network error: {}", reason),
    }
}

fn text_of(selector: &Selector, doc: &Document, state: &PageState) -> Option<String> {
    match selector {
        Selector::Id(id) if doc.is_message_id(id) => state.message.as_ref().map(|m| m.text.clone()),
        Selector::Id(id) => doc.has_id(id).then(String::new),
        Selector::SubmitButton => doc.submit_label().map(String::from),
        Selector::Message(kind) => state
            .message
            .as_ref()
            .filter(|m| kind.map_or(true, |k| k == m.kind))
            .map(|m| m.text.clone()),
        Selector::AnyOf(parts) => parts.iter().find_map(|part| text_of(part, doc, state)),
    }
}

/// `String(value)` for the JSON values a response can carry
fn js_display(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// `data.error || 'Unknown error'`
fn error_reason(error: Option<&Value>) -> String {
    let falsy = match error {
        None | Some(Value::Null) | Some(Value::Bool(false)) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(_) => false,
    };
    if falsy {
        "Unknown error".to_string()
    } else {
        js_display(error)
    }
}

fn detail<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// A finite number as a number input would accept it
fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Resolve the form endpoint against the page URL, as `fetch()` does
fn endpoint_url(page_url: &Url, endpoint: &str) -> E2eResult<Url> {
    Ok(page_url.join(endpoint)?)
}

fn navigation_error(url: &str, reason: impl std::fmt::Display) -> E2eError {
    E2eError::Navigation {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
