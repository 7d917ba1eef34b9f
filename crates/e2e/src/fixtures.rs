//! Transfer endpoint contract and the fixtures that stand in for it

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::E2eResult;
use crate::intercept::{AbortReason, FabricatedResponse, InterceptedRequest, RouteAction};

/// Route glob for the transfer endpoint
pub const TRANSFER_ROUTE: &str = "**/api/transfer";

/// Body the page posts to the endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub recipient: String,
    pub amount: f64,
}

/// Body of a successful transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAccepted {
    pub status: String,
    pub transaction_id: String,
}

/// Body of a rejected transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRejected {
    pub error: String,
}

/// How the endpoint answers during a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fixture {
    /// 200 with a transaction id
    Success { transaction_id: String },

    /// Application error with a JSON `{error}` body
    Rejected {
        #[serde(default = "default_reject_status")]
        status: u16,
        error: String,
    },

    /// The request is aborted before any response exists
    TransportFailure {
        #[serde(default)]
        reason: AbortReason,
    },

    /// No rule is registered at all
    None,
}

fn default_reject_status() -> u16 {
    400
}

impl Fixture {
    pub fn success(transaction_id: impl Into<String>) -> Self {
        Fixture::Success {
            transaction_id: transaction_id.into(),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Fixture::Rejected {
            status: default_reject_status(),
            error: error.into(),
        }
    }

    pub fn transport_failure() -> Self {
        Fixture::TransportFailure {
            reason: AbortReason::Failed,
        }
    }

    /// The action this fixture answers with, `None` for [`Fixture::None`]
    pub fn action(&self) -> E2eResult<Option<RouteAction>> {
        let action = match self {
            Fixture::Success { transaction_id } => RouteAction::Fulfill(FabricatedResponse::json(
                200,
                &TransferAccepted {
                    status: "success".to_string(),
                    transaction_id: transaction_id.clone(),
                },
            )?),
            Fixture::Rejected { status, error } => RouteAction::Fulfill(FabricatedResponse::json(
                *status,
                &TransferRejected {
                    error: error.clone(),
                },
            )?),
            Fixture::TransportFailure { reason } => RouteAction::Abort(*reason),
            Fixture::None => return Ok(None),
        };
        Ok(Some(action))
    }

    /// A responder that logs the interception and answers with this fixture
    pub fn responder(
        &self,
    ) -> E2eResult<Option<impl Fn(&InterceptedRequest) -> RouteAction + Send + Sync + 'static>> {
        let Some(action) = self.action()? else {
            return Ok(None);
        };
        let label = self.label();
        Ok(Some(move |request: &InterceptedRequest| {
            info!("[Mock] Intercepted {} {} - {}", request.method, request.url, label);
            action.clone()
        }))
    }

    fn label(&self) -> String {
        match self {
            Fixture::Success { .. } => "returning success".to_string(),
            Fixture::Rejected { status, .. } => format!("returning {} error", status),
            Fixture::TransportFailure { reason } => format!("aborting ({})", reason),
            Fixture::None => "not intercepted".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn body_of(action: RouteAction) -> (u16, Value) {
        match action {
            RouteAction::Fulfill(resp) => (resp.status, serde_json::from_str(&resp.body).unwrap()),
            RouteAction::Abort(reason) => panic!("unexpected abort: {reason}"),
        }
    }

    #[test]
    fn test_success_fixture_body() {
        let (status, body) = body_of(Fixture::success("12345").action().unwrap().unwrap());
        assert_eq!(status, 200);
        assert_eq!(body, serde_json::json!({ "status": "success", "transactionId": "12345" }));
    }

    #[test]
    fn test_rejected_fixture_body() {
        let (status, body) = body_of(Fixture::rejected("Insufficient funds").action().unwrap().unwrap());
        assert_eq!(status, 400);
        assert_eq!(body, serde_json::json!({ "error": "Insufficient funds" }));
    }

    #[test]
    fn test_transport_failure_aborts() {
        let action = Fixture::transport_failure().action().unwrap();
        assert_eq!(action, Some(RouteAction::Abort(AbortReason::Failed)));
    }

    #[test]
    fn test_none_fixture_has_no_responder() {
        assert!(Fixture::None.action().unwrap().is_none());
        assert!(Fixture::None.responder().unwrap().is_none());
    }

    #[test]
    fn test_responder_answers_every_call_identically() {
        let responder = Fixture::success("42").responder().unwrap().unwrap();
        let request = InterceptedRequest {
            method: "POST".to_string(),
            url: "http://h/api/transfer".to_string(),
            headers: BTreeMap::new(),
            post_data: None,
        };
        assert_eq!(responder(&request), responder(&request));
    }

    #[test]
    fn test_fixture_yaml_forms() {
        let fixtures: Vec<Fixture> = serde_yaml::from_str(
            r#"
- kind: success
  transaction_id: "12345"
- kind: rejected
  error: Insufficient funds
- kind: transport_failure
- kind: none
"#,
        )
        .unwrap();
        assert_eq!(
            fixtures,
            vec![
                Fixture::success("12345"),
                Fixture::rejected("Insufficient funds"),
                Fixture::transport_failure(),
                Fixture::None,
            ]
        );
    }
}
