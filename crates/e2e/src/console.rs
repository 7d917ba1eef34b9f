//! Console output captured from the page
//!
//! The transfer page logs JSON lines carrying an `event` field next to the
//! human-readable `message`. Assertions key on the event kind; plain-text
//! lines fall back to the legacy markers ("Transfer successful", "✅", ...).

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Console message type as reported by the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Log,
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
    #[serde(other)]
    Other,
}

/// Discrete outcome events the page reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "transfer.success")]
    TransferSuccess,
    #[serde(rename = "transfer.failure")]
    TransferFailure,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TransferSuccess => "transfer.success",
            EventKind::TransferFailure => "transfer.failure",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "transfer.success" => Some(EventKind::TransferSuccess),
            "transfer.failure" => Some(EventKind::TransferFailure),
            _ => None,
        }
    }

    fn legacy_markers(&self) -> &'static [&'static str] {
        match self {
            EventKind::TransferSuccess => &["Transfer successful", "✅"],
            EventKind::TransferFailure => &["Transfer failed", "❌"],
        }
    }

    /// Classify an unstructured line by its markers
    pub fn infer_from_text(text: &str) -> Option<Self> {
        [EventKind::TransferSuccess, EventKind::TransferFailure]
            .into_iter()
            .find(|kind| kind.legacy_markers().iter().any(|m| text.contains(m)))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One console line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleRecord {
    pub severity: Severity,
    pub text: String,
}

impl ConsoleRecord {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }

    /// A structured line in the format the transfer page emits
    pub fn structured(severity: Severity, event: &str, message: &str, detail: Map<String, Value>) -> Self {
        let mut object = Map::new();
        object.insert("event".to_string(), Value::from(event));
        object.insert("message".to_string(), Value::from(message));
        object.extend(detail);
        Self::new(severity, Value::Object(object).to_string())
    }

    fn as_object(&self) -> Option<Map<String, Value>> {
        match serde_json::from_str::<Value>(&self.text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// The `event` field of a structured line
    pub fn event_name(&self) -> Option<String> {
        self.as_object()?
            .get("event")?
            .as_str()
            .map(String::from)
    }

    /// Outcome event carried by this line. Structured lines are trusted as
    /// is; only plain lines are classified by their text.
    pub fn kind(&self) -> Option<EventKind> {
        match self.event_name() {
            Some(name) => EventKind::from_event_name(&name),
            None => EventKind::infer_from_text(&self.text),
        }
    }

    /// Human-readable text: the `message` field when structured
    pub fn message(&self) -> String {
        self.as_object()
            .and_then(|map| map.get("message").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| self.text.clone())
    }
}

/// Append-only console record shared between the page and the scenario
#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
    records: Arc<Mutex<Vec<ConsoleRecord>>>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: ConsoleRecord) {
        self.records.lock().push(record);
    }

    pub fn snapshot(&self) -> Vec<ConsoleRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn contains_kind(&self, kind: EventKind) -> bool {
        self.records.lock().iter().any(|r| r.kind() == Some(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_line_kind_and_message() {
        let record = ConsoleRecord::structured(
            Severity::Log,
            "transfer.success",
            "✅ Transfer successful",
            Map::from_iter([("transactionId".to_string(), Value::from("12345"))]),
        );
        assert_eq!(record.kind(), Some(EventKind::TransferSuccess));
        assert_eq!(record.message(), "✅ Transfer successful");
        assert!(record.text.contains("\"transactionId\":\"12345\""));
    }

    #[test]
    fn test_structured_line_with_other_event_is_not_classified_by_text() {
        // The message mentions a marker, but the event says otherwise.
        let record = ConsoleRecord::structured(Severity::Info, "transfer.submit", "Transfer failed before?", Map::new());
        assert_eq!(record.event_name().as_deref(), Some("transfer.submit"));
        assert_eq!(record.kind(), None);
    }

    #[test]
    fn test_plain_lines_fall_back_to_markers() {
        let ok = ConsoleRecord::new(Severity::Log, "Transfer successful: 12345");
        let glyph = ConsoleRecord::new(Severity::Log, "✅ done");
        let failed = ConsoleRecord::new(Severity::Error, "❌ Transfer failed: Insufficient funds");
        let noise = ConsoleRecord::new(Severity::Log, "page loaded");

        assert_eq!(ok.kind(), Some(EventKind::TransferSuccess));
        assert_eq!(glyph.kind(), Some(EventKind::TransferSuccess));
        assert_eq!(failed.kind(), Some(EventKind::TransferFailure));
        assert_eq!(noise.kind(), None);
        assert_eq!(noise.message(), "page loaded");
    }

    #[test]
    fn test_severity_accepts_browser_type_names() {
        let parsed: Vec<Severity> = serde_json::from_str(r#"["log","warning","warn","error","dir"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![Severity::Log, Severity::Warning, Severity::Warning, Severity::Error, Severity::Other]
        );
    }

    #[test]
    fn test_log_is_shared_between_clones() {
        let log = ConsoleLog::new();
        let writer = log.clone();
        writer.push(ConsoleRecord::new(Severity::Error, "❌ Transfer failed"));

        assert_eq!(log.len(), 1);
        assert!(log.contains_kind(EventKind::TransferFailure));
        assert!(!log.contains_kind(EventKind::TransferSuccess));
    }
}
