//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Resolve the log filter from environment and config
//!
//! # Design Decisions
//! - `RUST_LOG` wins, then `CAMPUS_ACCESS_LOG`, then the configured level
//! - Initialization is idempotent; a second call is a no-op

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "CAMPUS_ACCESS_LOG";

/// Filter directive after applying the environment precedence.
pub fn resolve_filter(configured: &str) -> String {
    [std::env::var("RUST_LOG").ok(), std::env::var(LOG_ENV).ok()]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| configured.to_string())
}

/// Install the fmt subscriber.
///
/// Returns `false` if a global subscriber was already set.
pub fn init(configured_level: &str) -> bool {
    let directive = resolve_filter(configured_level);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = %directive, "Logging initialized");
    }
    installed
}
