//! Two-tier result cache with request coalescing.
//!
//! # Responsibilities
//! - Serve fresh entries without calling the producer
//! - Merge concurrent fetches of one key into a single producer call
//! - Keep the last good value of every key for failure-path fallback
//! - Write persisted-tier entries through to durable storage
//!
//! # Design Decisions
//! - Values are stored as JSON so one cache serves every response type
//! - The in-flight slot is a `Shared` future; it removes itself from the
//!   map once it has stored its result
//! - A failed durable write is logged, never surfaced; the fetched value is
//!   still returned and kept in memory

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::key::{CacheEntry, CacheKey, Cached};
use crate::classify::RejectError;
use crate::clock::now_millis;
use crate::observability::metrics::{record_cache, CacheResult};
use crate::storage::{DurableStorage, Repository};

type SharedFetch = Shared<BoxFuture<'static, Result<Value, RejectError>>>;

/// Process-wide result cache.
#[derive(Clone)]
pub struct CacheLayer {
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
    repo: Repository<CacheEntry>,
    in_flight: Arc<Mutex<HashMap<CacheKey, SharedFetch>>>,
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl CacheLayer {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            repo: Repository::new(storage, "cache"),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Entry for `key`, loading persisted entries from storage on first use.
    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.get(key) {
            return Some(entry.value().clone());
        }

        let CacheKey::Persisted(stable) = key else {
            return None;
        };
        match self.repo.get(stable).await {
            Ok(Some(entry)) => {
                let entry = self.entries.entry(key.clone()).or_insert(entry).clone();
                Some(entry)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%key, error = %err, "Failed to load persisted cache entry");
                None
            }
        }
    }

    /// Return a fresh cached value or run `producer` and store its result.
    ///
    /// Concurrent calls for one key share a single `producer` invocation and
    /// all observe its outcome.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &CacheKey,
        stale_time: Duration,
        producer: F,
    ) -> Result<T, RejectError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RejectError>> + Send + 'static,
    {
        if let Some(entry) = self.lookup(key).await {
            if entry.is_fresh(now_millis(), stale_time) {
                record_cache(CacheResult::Hit);
                tracing::debug!(%key, "Cache hit");
                return decode(key, entry.value);
            }
        }

        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(key) {
                Some(pending) => {
                    record_cache(CacheResult::Coalesced);
                    tracing::debug!(%key, "Joining in-flight fetch");
                    pending.clone()
                }
                None => {
                    record_cache(CacheResult::Miss);
                    tracing::debug!(%key, "Cache miss");
                    let shared = self.produce(key.clone(), producer()).boxed().shared();
                    in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let value = shared.await?;
        decode(key, value)
    }

    fn produce<T, Fut>(
        &self,
        key: CacheKey,
        fut: Fut,
    ) -> impl Future<Output = Result<Value, RejectError>> + Send + 'static
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = Result<T, RejectError>> + Send + 'static,
    {
        let entries = self.entries.clone();
        let repo = self.repo.clone();
        let in_flight = self.in_flight.clone();

        async move {
            let result = fut.await.and_then(|value| {
                serde_json::to_value(value)
                    .map_err(|err| RejectError::internal(format!("unencodable response: {err}")))
            });

            if let Ok(value) = &result {
                let entry = CacheEntry::new(value.clone(), now_millis());
                entries.insert(key.clone(), entry.clone());
                if let CacheKey::Persisted(stable) = &key {
                    if let Err(err) = repo.put(stable, &entry).await {
                        tracing::warn!(%key, error = %err, "Failed to persist cache entry");
                    }
                }
            }

            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
            result
        }
    }

    /// Last stored value for `key`, regardless of freshness.
    pub async fn fallback<T>(&self, key: &CacheKey) -> Option<Cached<T>>
    where
        T: DeserializeOwned,
    {
        let entry = self.lookup(key).await?;
        match serde_json::from_value(entry.value) {
            Ok(value) => Some(Cached {
                value,
                captured_at_ms: entry.captured_at_ms,
            }),
            Err(err) => {
                tracing::warn!(%key, error = %err, "Cached value no longer decodes");
                None
            }
        }
    }

    /// Force the next `fetch` of `key` to call its producer.
    ///
    /// The value stays available to `fallback`.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        if self.lookup(key).await.is_none() {
            return false;
        }
        let entry = match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.invalidated = true;
                entry.clone()
            }
            None => return false,
        };
        if let CacheKey::Persisted(stable) = key {
            if let Err(err) = self.repo.put(stable, &entry).await {
                tracing::warn!(%key, error = %err, "Failed to persist invalidation");
            }
        }
        tracing::debug!(%key, "Cache entry invalidated");
        true
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the volatile tier and flush the persisted one.
    pub async fn dispose(&self) {
        self.entries.retain(|key, _| key.is_persisted());
        if let Err(err) = self.repo.flush().await {
            tracing::warn!(error = %err, "Failed to flush cache storage");
        }
    }
}

fn decode<T: DeserializeOwned>(key: &CacheKey, value: Value) -> Result<T, RejectError> {
    serde_json::from_value(value).map_err(|err| {
        tracing::warn!(%key, error = %err, "Cached value has an unexpected shape");
        RejectError::internal(format!("cached value for {key} does not decode: {err}"))
    })
}
