//! User-facing presentation of classified errors.

use std::collections::HashSet;

use crate::classify::reject::{RejectError, ReloginCause};

/// Business codes that are never surfaced to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenignCodes(HashSet<String>);

impl BenignCodes {
    pub fn new(codes: impl IntoIterator<Item = String>) -> Self {
        Self(codes.into_iter().collect())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }
}

/// What the UI should offer alongside a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeAction {
    /// Send the user to the login screen.
    SignIn,
    TryAgain,
    CheckNetwork,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotice {
    pub message: String,
    pub action: NoticeAction,
}

impl UserNotice {
    fn new(message: impl Into<String>, action: NoticeAction) -> Self {
        Self {
            message: message.into(),
            action,
        }
    }
}

/// Map `error` to what the user sees; `None` for benign business codes.
pub fn present(error: &RejectError, benign: &BenignCodes) -> Option<UserNotice> {
    let notice = match error {
        RejectError::AuthFailed { .. } => {
            UserNotice::new("Your session has expired, please sign in again", NoticeAction::SignIn)
        }
        RejectError::ReLoginFailed {
            cause: ReloginCause::InvalidCredentials,
            ..
        } => UserNotice::new(
            "Automatic sign-in failed, please check your account and sign in again",
            NoticeAction::SignIn,
        ),
        RejectError::ReLoginFailed { .. } => UserNotice::new(
            "Automatic sign-in is unavailable right now, showing saved data where possible",
            NoticeAction::TryAgain,
        ),
        RejectError::BizFailed { code, .. } if benign.contains(code) => return None,
        RejectError::BizFailed { message, .. } if !message.is_empty() => {
            UserNotice::new(message.clone(), NoticeAction::Dismiss)
        }
        RejectError::BizFailed { code, .. } => {
            UserNotice::new(format!("Request rejected (code {code})"), NoticeAction::Dismiss)
        }
        RejectError::InternalFailed { .. } => UserNotice::new(
            "Network error or server failure, please try again later",
            NoticeAction::TryAgain,
        ),
        RejectError::Timeout => {
            UserNotice::new("The request timed out, please try again later", NoticeAction::TryAgain)
        }
        RejectError::NetworkError => UserNotice::new(
            "Network unavailable, please check your connection",
            NoticeAction::CheckNetwork,
        ),
        RejectError::NativeLoginFailed { message } => {
            UserNotice::new(message.clone(), NoticeAction::SignIn)
        }
        RejectError::EvaluationNotFound { message } => {
            UserNotice::new(message.clone(), NoticeAction::Dismiss)
        }
    };
    Some(notice)
}
