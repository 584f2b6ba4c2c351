//! HTTP boundary: origin allow-list, method gate, JSON in, response contract out.

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::errors::{ErrorKind, ValidationError};
use crate::request::RawRequest;
use crate::transport::Connector;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use worker::{Method, Request, Response};

const ALLOWED_METHODS: &str = "POST, OPTIONS";

/// Origins allowed to call the endpoint. `*` allows any, including none.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed: Vec<String>,
}

impl CorsPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    fn wildcard(&self) -> bool {
        self.allowed.iter().any(|o| o == "*")
    }

    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.wildcard() {
            return true;
        }
        match origin {
            Some(origin) => {
                let origin = origin.trim_end_matches('/');
                self.allowed
                    .iter()
                    .any(|a| a.trim_end_matches('/').eq_ignore_ascii_case(origin))
            }
            None => false,
        }
    }

    /// Value for `Access-Control-Allow-Origin`, if one should be sent.
    pub fn allow_origin(&self, origin: Option<&str>) -> Option<String> {
        match origin {
            Some(o) if self.allows(Some(o)) => Some(o.to_string()),
            None if self.wildcard() => Some("*".to_string()),
            _ => None,
        }
    }
}

/// What to do with a request that passed the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Preflight,
    Dispatch,
}

/// Origin first, then method. Nothing else is looked at.
pub fn gate(method: &Method, origin: Option<&str>, cors: &CorsPolicy) -> Result<Gate, ErrorKind> {
    if !cors.allows(origin) {
        return Err(ErrorKind::OriginNotAllowed);
    }
    match method {
        Method::Options => Ok(Gate::Preflight),
        Method::Post => Ok(Gate::Dispatch),
        _ => Err(ErrorKind::MethodNotAllowed),
    }
}

/// JSON body returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: String,
}

/// Status and body for a dispatch outcome.
pub fn outcome_response(outcome: &DispatchOutcome) -> (u16, ResponseBody) {
    match outcome.error {
        None => (
            200,
            ResponseBody {
                success: true,
                message_id: outcome.message_id.clone(),
                message: "Message sent successfully".to_string(),
                error: None,
                details: None,
                timestamp: outcome.timestamp_iso(),
            },
        ),
        Some(ref failure) => (
            failure.kind.http_status(),
            ResponseBody {
                success: false,
                message_id: None,
                message: failure.message.clone(),
                error: Some(failure.kind.code().to_string()),
                details: if failure.kind == ErrorKind::UnknownTransportError {
                    failure.diagnostic.clone()
                } else {
                    None
                },
                timestamp: outcome.timestamp_iso(),
            },
        ),
    }
}

/// Status and body for a request stopped at the boundary.
pub fn rejection_response(kind: ErrorKind, message: Option<String>) -> (u16, ResponseBody) {
    (
        kind.http_status(),
        ResponseBody {
            success: false,
            message_id: None,
            message: message.unwrap_or_else(|| kind.user_message().to_string()),
            error: Some(kind.code().to_string()),
            details: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        },
    )
}

fn json_response(
    status: u16,
    body: &ResponseBody,
    allow_origin: Option<&str>,
) -> worker::Result<Response> {
    let mut response = Response::from_json(body)?.with_status(status);
    let headers = response.headers_mut();
    if let Some(origin) = allow_origin {
        headers.set("Access-Control-Allow-Origin", origin)?;
        headers.set("Vary", "Origin")?;
    }
    if status == 405 {
        headers.set("Allow", ALLOWED_METHODS)?;
    }
    Ok(response)
}

fn preflight_response(allow_origin: Option<&str>) -> worker::Result<Response> {
    let mut response = Response::empty()?.with_status(204);
    let headers = response.headers_mut();
    if let Some(origin) = allow_origin {
        headers.set("Access-Control-Allow-Origin", origin)?;
        headers.set("Vary", "Origin")?;
    }
    headers.set("Access-Control-Allow-Methods", ALLOWED_METHODS)?;
    headers.set("Access-Control-Allow-Headers", "Content-Type")?;
    headers.set("Access-Control-Max-Age", "86400")?;
    Ok(response)
}

/// Serves one inbound request.
pub async fn handle<C: Connector>(mut req: Request, dispatcher: &Dispatcher<C>) -> worker::Result<Response> {
    let cors = CorsPolicy::new(dispatcher.config().allowed_origins.clone());
    let origin = req.headers().get("Origin")?;
    let allow_origin = cors.allow_origin(origin.as_deref());

    match gate(&req.method(), origin.as_deref(), &cors) {
        Ok(Gate::Preflight) => return preflight_response(allow_origin.as_deref()),
        Ok(Gate::Dispatch) => {}
        Err(kind) => {
            dispatcher.logger().warn(&format!(
                "{} {:?} from origin {:?}",
                kind.code(),
                req.method(),
                origin
            ));
            let (status, body) = rejection_response(kind, None);
            return json_response(status, &body, allow_origin.as_deref());
        }
    }

    let raw = match req.json::<RawRequest>().await {
        Ok(raw) => raw,
        Err(e) => {
            let error = ValidationError::MalformedBody(e.to_string());
            dispatcher.logger().warn(&error.to_string());
            let (status, body) = rejection_response(ErrorKind::ValidationError, Some(error.to_string()));
            return json_response(status, &body, allow_origin.as_deref());
        }
    };

    let outcome = dispatcher.dispatch(raw).await;
    let (status, body) = outcome_response(&outcome);
    json_response(status, &body, allow_origin.as_deref())
}
