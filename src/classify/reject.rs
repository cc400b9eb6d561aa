//! The classified error taxonomy.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::session::BackendId;

/// Why an automatic re-login did not produce a usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloginCause {
    /// The stored credentials are definitely wrong.
    InvalidCredentials,
    /// The login backend could not be reached or timed out.
    Unreachable,
    /// The login succeeded but the retried request was rejected again.
    RetryRejected,
    /// No re-login strategy is registered for the backend.
    NoStrategy,
    /// The new credential could not be stored.
    Storage,
}

impl ReloginCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloginCause::InvalidCredentials => "invalid_credentials",
            ReloginCause::Unreachable => "unreachable",
            ReloginCause::RetryRejected => "retry_rejected",
            ReloginCause::NoStrategy => "no_strategy",
            ReloginCause::Storage => "storage",
        }
    }
}

impl fmt::Display for ReloginCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure, the only error type that leaves the request façade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectError {
    #[error("{backend} rejected the session credential")]
    AuthFailed { backend: BackendId },

    #[error("automatic re-login failed ({cause}): {reason}")]
    ReLoginFailed { cause: ReloginCause, reason: String },

    #[error("business rejection {code}: {message}")]
    BizFailed {
        code: String,
        message: String,
        data: Value,
    },

    #[error("unexpected backend response{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    InternalFailed { status: Option<u16>, detail: String },

    #[error("request timed out")]
    Timeout,

    #[error("network unavailable")]
    NetworkError,

    #[error("login failed: {message}")]
    NativeLoginFailed { message: String },

    #[error("evaluation not completed: {message}")]
    EvaluationNotFound { message: String },
}

/// Fieldless discriminant of [`RejectError`], for labels and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectKind {
    AuthFailed,
    ReLoginFailed,
    BizFailed,
    InternalFailed,
    Timeout,
    NetworkError,
    NativeLoginFailed,
    EvaluationNotFound,
}

impl RejectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectKind::AuthFailed => "auth_failed",
            RejectKind::ReLoginFailed => "relogin_failed",
            RejectKind::BizFailed => "biz_failed",
            RejectKind::InternalFailed => "internal_failed",
            RejectKind::Timeout => "timeout",
            RejectKind::NetworkError => "network_error",
            RejectKind::NativeLoginFailed => "native_login_failed",
            RejectKind::EvaluationNotFound => "evaluation_not_found",
        }
    }
}

impl RejectError {
    pub fn kind(&self) -> RejectKind {
        match self {
            RejectError::AuthFailed { .. } => RejectKind::AuthFailed,
            RejectError::ReLoginFailed { .. } => RejectKind::ReLoginFailed,
            RejectError::BizFailed { .. } => RejectKind::BizFailed,
            RejectError::InternalFailed { .. } => RejectKind::InternalFailed,
            RejectError::Timeout => RejectKind::Timeout,
            RejectError::NetworkError => RejectKind::NetworkError,
            RejectError::NativeLoginFailed { .. } => RejectKind::NativeLoginFailed,
            RejectError::EvaluationNotFound { .. } => RejectKind::EvaluationNotFound,
        }
    }

    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        RejectError::InternalFailed {
            status: None,
            detail: detail.into(),
        }
    }

    pub(crate) fn relogin(cause: ReloginCause, reason: impl Into<String>) -> Self {
        RejectError::ReLoginFailed {
            cause,
            reason: reason.into(),
        }
    }

    /// Whether a cached value may be served in place of this error.
    ///
    /// Only rejected stored credentials are exempt: the user has to sign in
    /// again, so old data must not hide the prompt.
    pub fn allows_stale_fallback(&self) -> bool {
        !matches!(
            self,
            RejectError::ReLoginFailed {
                cause: ReloginCause::InvalidCredentials,
                ..
            }
        )
    }
}
