//! Document model of the page under test
//!
//! Only what the transfer flow touches is modelled: elements with ids, the
//! form inputs, the submit button, the form endpoint and the message element.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

static SCRIPT_OR_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->").unwrap());
static START_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<([a-z][a-z0-9-]*)\b([^>]*)>").unwrap());
static BUTTON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<button\b([^>]*)>(.*?)</button\s*>").unwrap());
static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").unwrap());
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#).unwrap()
});
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Endpoint the form posts to when it carries no `data-endpoint`
pub const DEFAULT_ENDPOINT: &str = "/api/transfer";

/// Terminal message flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Success,
    Error,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Success => "success",
            MessageKind::Error => "error",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The selector subset the flow uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `#id`
    Id(String),
    /// `button[type="submit"]`
    SubmitButton,
    /// `.message`, `.message.success`, `.message.error`
    Message(Option<MessageKind>),
    /// Comma-separated list, matches if any part does
    AnyOf(Vec<Selector>),
}

impl Selector {
    pub fn parse(selector: &str) -> E2eResult<Self> {
        let parts: Vec<&str> = selector.split(',').map(str::trim).collect();
        if parts.len() > 1 {
            return parts
                .into_iter()
                .map(Self::parse_one)
                .collect::<E2eResult<Vec<_>>>()
                .map(Selector::AnyOf);
        }
        Self::parse_one(selector.trim())
    }

    fn parse_one(selector: &str) -> E2eResult<Self> {
        let unsupported = || E2eError::Config(format!("unsupported selector: {:?}", selector));

        if let Some(id) = selector.strip_prefix('#') {
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                return Ok(Selector::Id(id.to_string()));
            }
            return Err(unsupported());
        }

        let normalized: String = selector.chars().filter(|c| *c != '"' && *c != '\'').collect();
        if normalized == "button[type=submit]" {
            return Ok(Selector::SubmitButton);
        }

        if let Some(classes) = selector.strip_prefix('.') {
            let classes: Vec<&str> = classes.split('.').collect();
            if !classes.contains(&"message") {
                return Err(unsupported());
            }
            let mut kind = None;
            for class in classes {
                match class {
                    "message" => {}
                    "success" if kind.is_none() => kind = Some(MessageKind::Success),
                    "error" if kind.is_none() => kind = Some(MessageKind::Error),
                    _ => return Err(unsupported()),
                }
            }
            return Ok(Selector::Message(kind));
        }

        Err(unsupported())
    }
}

/// An `<input>` element
#[derive(Debug, Clone, PartialEq)]
pub struct InputField {
    pub id: String,
    pub input_type: String,
    pub required: bool,
    pub value: String,
}

impl InputField {
    pub fn is_numeric(&self) -> bool {
        self.input_type == "number"
    }
}

/// Static view of a loaded document
#[derive(Debug, Clone, Default)]
pub struct Document {
    title: Option<String>,
    ids: Vec<String>,
    inputs: Vec<InputField>,
    submit_label: Option<String>,
    endpoint: Option<String>,
    novalidate: bool,
    message_id: Option<String>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let markup = SCRIPT_OR_COMMENT.replace_all(html, "");
        let mut doc = Document {
            title: TITLE
                .captures(html)
                .map(|c| collapse_whitespace(&c[1]))
                .filter(|t| !t.is_empty()),
            ..Default::default()
        };

        for tag in START_TAG.captures_iter(&markup) {
            let name = tag[1].to_ascii_lowercase();
            let attrs = parse_attributes(&tag[2]);
            let id = attrs.get("id").cloned();

            if let Some(id) = &id {
                doc.ids.push(id.clone());
            }

            match name.as_str() {
                "input" => {
                    if let Some(id) = &id {
                        doc.inputs.push(InputField {
                            id: id.clone(),
                            input_type: attrs
                                .get("type")
                                .map(|t| t.to_ascii_lowercase())
                                .unwrap_or_else(|| "text".to_string()),
                            required: attrs.contains_key("required"),
                            value: attrs.get("value").cloned().unwrap_or_default(),
                        });
                    }
                }
                "form" if doc.endpoint.is_none() => {
                    doc.novalidate = attrs.contains_key("novalidate");
                    doc.endpoint = Some(
                        attrs
                            .get("data-endpoint")
                            .cloned()
                            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                    );
                }
                _ => {}
            }

            let is_message = attrs
                .get("class")
                .map(|c| c.split_whitespace().any(|class| class == "message"))
                .unwrap_or(false);
            if is_message && doc.message_id.is_none() {
                doc.message_id = id.or_else(|| Some(String::new()));
            }
        }

        for button in BUTTON.captures_iter(&markup) {
            let attrs = parse_attributes(&button[1]);
            let is_submit = attrs
                .get("type")
                .map(|t| t.eq_ignore_ascii_case("submit"))
                .unwrap_or(true);
            if is_submit {
                doc.submit_label = Some(collapse_whitespace(&TAGS.replace_all(&button[2], "")));
                break;
            }
        }

        doc
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    pub fn input(&self, id: &str) -> Option<&InputField> {
        self.inputs.iter().find(|i| i.id == id)
    }

    pub fn inputs(&self) -> &[InputField] {
        &self.inputs
    }

    pub fn submit_label(&self) -> Option<&str> {
        self.submit_label.as_deref()
    }

    /// Form endpoint, `None` when the document has no form
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// The form leaves validation to its script instead of the browser
    pub fn novalidate(&self) -> bool {
        self.novalidate
    }

    pub fn has_message_element(&self) -> bool {
        self.message_id.is_some()
    }

    /// Whether `id` names the message element
    pub fn is_message_id(&self, id: &str) -> bool {
        self.message_id.as_deref() == Some(id)
    }
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            (c[1].to_ascii_lowercase(), value)
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head><title> Money
  Transfer </title></head>
<body>
  <!-- <input id="ghost"> -->
  <form id="transfer-form" data-endpoint="/api/transfer">
    <input id="recipient" type="text" required>
    <input id='amount' type=number step="any" required>
    <button type="submit"><span>Send</span> transfer</button>
  </form>
  <div id="message" class="message" hidden></div>
  <script>document.write('<input id="scripted">');</script>
</body></html>"#;

    #[test]
    fn test_parse_transfer_page() {
        let doc = Document::parse(PAGE);

        assert_eq!(doc.title(), Some("Money Transfer"));
        assert_eq!(doc.endpoint(), Some("/api/transfer"));
        assert!(!doc.novalidate());
        assert_eq!(doc.submit_label(), Some("Send transfer"));
        assert!(doc.has_message_element());
        assert!(doc.is_message_id("message"));

        let amount = doc.input("amount").unwrap();
        assert!(amount.is_numeric());
        assert!(amount.required);
        assert_eq!(doc.input("recipient").unwrap().input_type, "text");

        assert!(doc.input("ghost").is_none(), "comments are ignored");
        assert!(doc.input("scripted").is_none(), "script bodies are ignored");
    }

    #[test]
    fn test_form_without_endpoint_uses_default() {
        let doc = Document::parse(r#"<form><input id="a"><button>Go</button></form>"#);
        assert_eq!(doc.endpoint(), Some(DEFAULT_ENDPOINT));
        assert_eq!(doc.submit_label(), Some("Go"));

        let doc = Document::parse(r#"<form data-endpoint="/x" novalidate><input id="a" required></form>"#);
        assert!(doc.novalidate());
        assert!(!doc.has_message_element());
    }

    #[test]
    fn test_not_found_page_has_no_form() {
        let doc = Document::parse("Not found");
        assert!(doc.endpoint().is_none());
        assert!(doc.inputs().is_empty());
        assert!(doc.submit_label().is_none());
    }

    #[test_case("#recipient", Selector::Id("recipient".into()) ; "id")]
    #[test_case(r#"button[type="submit"]"#, Selector::SubmitButton ; "submit double quotes")]
    #[test_case("button[type='submit']", Selector::SubmitButton ; "submit single quotes")]
    #[test_case(".message", Selector::Message(None) ; "any message")]
    #[test_case(".message.success", Selector::Message(Some(MessageKind::Success)) ; "success")]
    #[test_case(".error.message", Selector::Message(Some(MessageKind::Error)) ; "error reversed")]
    fn test_selector_parse(raw: &str, expected: Selector) {
        assert_eq!(Selector::parse(raw).unwrap(), expected);
    }

    #[test]
    fn test_selector_list() {
        assert_eq!(
            Selector::parse(".message.success, .message.error").unwrap(),
            Selector::AnyOf(vec![
                Selector::Message(Some(MessageKind::Success)),
                Selector::Message(Some(MessageKind::Error)),
            ])
        );
    }

    #[test_case("div > p" ; "combinator")]
    #[test_case("#" ; "empty id")]
    #[test_case(".success" ; "no message class")]
    #[test_case(".message.success.error" ; "two kinds")]
    fn test_unsupported_selectors(raw: &str) {
        assert!(matches!(Selector::parse(raw), Err(E2eError::Config(_))));
    }
}
