//! Error classification subsystem.
//!
//! # Data Flow
//! ```text
//! backend call fails
//!     → raw.rs (RawFailure: transport / response / malformed / relogin)
//!     → rules.rs (ordered rule table, first match wins)
//!     → reject.rs (RejectError, the only error leaving the façade)
//!     → notice.rs (UserNotice for the UI, or None for benign codes)
//! ```
//!
//! # Design Decisions
//! - Classification is a pure function of the raw failure and the current table
//! - Re-login failures have their own raw variant so they can never be
//!   classified as `AuthFailed` and loop back into the orchestrator

pub mod notice;
pub mod raw;
pub mod reject;
pub mod rules;

pub use notice::{present, BenignCodes, NoticeAction, UserNotice};
pub use raw::{BackendResponse, Envelope, RawFailure, TransportKind};
pub use reject::{RejectError, RejectKind, ReloginCause};
pub use rules::{Classifier, Rule};
