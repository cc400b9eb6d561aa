//! Cache keys and entries.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::StableKey;

/// Identity of a cached result; the variant decides the tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Lives for the process lifetime, keyed by call name and parameters.
    Volatile(String),
    /// Survives restarts, keyed by an explicit stable key.
    Persisted(StableKey),
}

impl CacheKey {
    /// Key derived from the call identity and the JSON form of its parameters.
    pub fn volatile<P>(call: &str, params: &P) -> Result<Self, serde_json::Error>
    where
        P: Serialize + ?Sized,
    {
        Ok(CacheKey::Volatile(format!(
            "{call}({})",
            serde_json::to_string(params)?
        )))
    }

    pub fn persisted(key: StableKey) -> Self {
        CacheKey::Persisted(key)
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, CacheKey::Persisted(_))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Volatile(key) => write!(f, "volatile:{key}"),
            CacheKey::Persisted(key) => write!(f, "persisted:{key}"),
        }
    }
}

/// A stored result and when it was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    pub captured_at_ms: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) invalidated: bool,
}

impl CacheEntry {
    pub fn new(value: Value, captured_at_ms: u64) -> Self {
        Self {
            value,
            captured_at_ms,
            invalidated: false,
        }
    }

    /// Whether the entry may be served without calling the producer.
    ///
    /// A zero `stale_time` is never fresh.
    pub fn is_fresh(&self, now_ms: u64, stale_time: Duration) -> bool {
        !self.invalidated
            && (now_ms.saturating_sub(self.captured_at_ms) as u128) < stale_time.as_millis()
    }
}

/// A value read back from the cache on a failure path.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub captured_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_volatile_key_includes_params() {
        let a = CacheKey::volatile("course_list", &json!({"term": "202401"})).unwrap();
        let b = CacheKey::volatile("course_list", &json!({"term": "202402"})).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), r#"volatile:course_list({"term":"202401"})"#);
        assert!(!a.is_persisted());
    }

    #[test]
    fn test_freshness_window() {
        let entry = CacheEntry::new(json!(1), 1_000);
        assert!(!entry.is_fresh(1_000, Duration::ZERO));
        assert!(entry.is_fresh(1_500, Duration::from_secs(1)));
        assert!(!entry.is_fresh(2_000, Duration::from_secs(1)));

        let mut invalidated = entry.clone();
        invalidated.invalidated = true;
        assert!(!invalidated.is_fresh(1_000, Duration::from_secs(60)));
    }
}
