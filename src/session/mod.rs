//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! AccessLayer::init
//!     → store.rs restores persisted sessions from durable storage
//!
//! façade request
//!     → store.view() (CredentialView snapshot) decorates the backend call
//!
//! re-login / rotated tokens
//!     → store.set() (Active, new generation, flushed before returning)
//!
//! logout
//!     → store.clear_all() (Anonymous, durable entries removed)
//! ```

pub mod account;
pub mod store;
pub mod types;

pub use account::{Account, AccountStore};
pub use store::SessionStore;
pub use types::{BackendId, Credential, CredentialView, Session, SessionState, UnknownBackend};
