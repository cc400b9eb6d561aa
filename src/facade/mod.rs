//! Request façade subsystem.
//!
//! # Data Flow
//! ```text
//! consumer
//!     → request.rs RequestFacade::request(call, params, options)
//!         cache key? → CacheLayer::fetch(producer = execute)
//!         execute:
//!             call.rs BackendCall::call(params, CredentialView)
//!             → failure → Classifier
//!             → AuthFailed → ReauthOrchestrator::recover → retry once
//!         other failure + cache key → CacheLayer::fallback
//!             → events.rs AccessEvent::StaleServed
//!     → Fetched{data, freshness} or RejectError
//!
//! query.rs wraps one request as a watchable QueryState for UI binding.
//! ```

pub mod call;
pub mod events;
pub mod query;
pub mod request;

pub use call::{BackendCall, Fetched, Freshness, Reply, RequestOptions};
pub use events::{AccessEvent, EventBus};
pub use query::{Query, QueryState, ViewState};
pub use request::RequestFacade;
