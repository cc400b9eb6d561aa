//! Raw failures as observed at the backend boundary, before classification.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::reject::ReloginCause;
use crate::session::BackendId;

/// Transport failures that never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// DNS or connect failure.
    Connect,
    /// The call exceeded its deadline.
    Timeout,
    Other,
}

/// `{code, message, data}` wrapper returned by envelope-style backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: String,
    #[serde(default, alias = "msg")]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Parse `body` as an envelope; numeric codes are accepted and stringified.
    pub fn parse(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        let object = value.as_object()?;
        let code = match object.get("code")? {
            Value::String(code) => code.clone(),
            Value::Number(code) => code.to_string(),
            _ => return None,
        };
        let message = object
            .get("message")
            .or_else(|| object.get("msg"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let data = object.get("data").cloned().unwrap_or(Value::Null);
        Some(Self {
            code,
            message,
            data,
        })
    }
}

/// A response that arrived but was not a success.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub backend: BackendId,
    pub status: u16,
    pub envelope: Option<Envelope>,
    pub body: String,
}

impl BackendResponse {
    /// Wrap a response body, parsing the envelope if it has one.
    pub fn new(backend: BackendId, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            backend,
            status,
            envelope: Envelope::parse(&body),
            body,
        }
    }

    pub fn with_envelope(backend: BackendId, status: u16, envelope: Envelope) -> Self {
        let body = serde_json::to_string(&envelope).unwrap_or_default();
        Self {
            backend,
            status,
            envelope: Some(envelope),
            body,
        }
    }
}

/// Everything a backend call can fail with.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    Transport { kind: TransportKind, message: String },
    Response(BackendResponse),
    /// The body arrived but could not be decoded into the expected shape.
    Malformed { backend: BackendId, detail: String },
    /// A locally run re-login failed.
    Relogin { cause: ReloginCause, reason: String },
}

impl RawFailure {
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        RawFailure::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::transport(
            TransportKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    /// Map a `reqwest` error onto the transport taxonomy.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            TransportKind::Connect
        } else {
            TransportKind::Other
        };
        Self::transport(kind, err.to_string())
    }
}

impl From<BackendResponse> for RawFailure {
    fn from(response: BackendResponse) -> Self {
        RawFailure::Response(response)
    }
}
