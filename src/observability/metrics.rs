//! Metrics collection.
//!
//! # Metrics
//! - `access_requests_total` (counter): façade requests by backend, outcome
//! - `access_cache_total` (counter): cache lookups by result
//!   (hit, miss, coalesced, stale)
//! - `access_relogin_total` (counter): re-login attempts by backend, outcome
//!
//! # Design Decisions
//! - No recorder is installed here; the host application decides where
//!   metrics go, and without one every call is a no-op
//! - Outcome labels reuse `RejectKind::as_str` so they match log fields

use metrics::counter;

use crate::session::BackendId;

/// Result of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheResult {
    Hit,
    Miss,
    Coalesced,
    Stale,
}

impl CacheResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheResult::Hit => "hit",
            CacheResult::Miss => "miss",
            CacheResult::Coalesced => "coalesced",
            CacheResult::Stale => "stale",
        }
    }
}

pub fn record_request(backend: BackendId, outcome: &'static str) {
    counter!(
        "access_requests_total",
        "backend" => backend.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_cache(result: CacheResult) {
    counter!("access_cache_total", "result" => result.as_str()).increment(1);
}

pub fn record_relogin(backend: BackendId, outcome: &'static str) {
    counter!(
        "access_relogin_total",
        "backend" => backend.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
