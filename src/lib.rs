//! Resilient data-access layer for a university companion app.
//!
//! Every backend call goes through one [`RequestFacade`]: failures are
//! classified into a closed set of [`RejectError`] kinds, expired sessions
//! are re-authenticated once per backend no matter how many requests hit
//! the expiry, and cached results are coalesced and served stale when the
//! network is down.

pub mod backends;
pub mod cache;
pub mod classify;
pub mod clock;
pub mod config;
pub mod facade;
pub mod lifecycle;
pub mod observability;
pub mod reauth;
pub mod session;
pub mod storage;

pub use cache::{CacheKey, CacheLayer};
pub use classify::{Classifier, RejectError, RejectKind};
pub use config::AccessConfig;
pub use facade::{AccessEvent, BackendCall, Fetched, RequestFacade, RequestOptions};
pub use lifecycle::{AccessLayer, Shutdown};
pub use reauth::ReauthOrchestrator;
pub use session::{BackendId, Credential, SessionStore};
