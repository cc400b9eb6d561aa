//! Wall-clock helpers.
//!
//! Timestamps stored in sessions and cache entries must stay meaningful
//! across process restarts, so they are Unix milliseconds rather than
//! `Instant`s.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
