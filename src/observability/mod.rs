//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one span per façade request)
//!     → metrics.rs (request, cache and re-login counters)
//!
//! Consumers:
//!     → stdout via tracing-subscriber fmt layer
//!     → whatever metrics recorder the host installs
//! ```
//!
//! # Design Decisions
//! - Request ID (UUID v4) is recorded on the façade span and inherited by
//!   every event below it
//! - Credentials never appear in logs; `Credential` redacts its `Debug`

pub mod logging;
pub mod metrics;
