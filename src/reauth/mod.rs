//! Re-authentication subsystem.
//!
//! # Data Flow
//! ```text
//! façade sees AuthFailed{backend}
//!     → orchestrator.rs recover(backend, observed generation)
//!         attempt pending?          → await it
//!         credential already newer? → return, caller retries
//!         otherwise                 → strategy.rs reauthenticate (bounded by timeout)
//!                                     → SessionStore::set / clear
//!     → façade retries the request once
//! ```

pub mod orchestrator;
pub mod strategy;

pub use orchestrator::{ReauthOrchestrator, ReauthState};
pub use strategy::{LoginFlow, ReauthError, ReauthStrategy, StoredAccountStrategy};
