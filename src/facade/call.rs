//! The contract between the façade and one backend operation.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheKey;
use crate::classify::RawFailure;
use crate::session::{BackendId, Credential, CredentialView};

/// One typed operation against a backend.
///
/// Implementations decorate the outgoing request from the credential view
/// and report failures raw; classification happens in the façade.
#[async_trait]
pub trait BackendCall: Send + Sync + 'static {
    type Params: Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn backend(&self) -> BackendId;

    /// Stable call name used in logs, metrics and volatile cache keys.
    fn name(&self) -> &str;

    async fn call(
        &self,
        params: &Self::Params,
        credentials: &CredentialView,
    ) -> Result<Reply<Self::Output>, RawFailure>;
}

/// A successful call result, plus any credentials the backend rotated.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub value: T,
    pub rotated: Vec<(BackendId, Credential)>,
}

impl<T> Reply<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            rotated: Vec::new(),
        }
    }

    /// Record a credential the backend issued alongside the value.
    pub fn rotate(mut self, backend: BackendId, credential: Credential) -> Self {
        self.rotated.push((backend, credential));
        self
    }
}

/// Per-request behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub cache_key: Option<CacheKey>,
    /// Freshness window; falls back to the configured default.
    pub stale_time: Option<Duration>,
    pub retry_on_auth: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cache_key: None,
            stale_time: None,
            retry_on_auth: true,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(mut self, key: CacheKey) -> Self {
        self.cache_key = Some(key);
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn without_auth_retry(mut self) -> Self {
        self.retry_on_auth = false;
        self
    }
}

/// Whether a result came from the backend just now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Served from cache after the fetch failed.
    Stale { captured_at_ms: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub freshness: Freshness,
}

impl<T> Fetched<T> {
    pub fn fresh(data: T) -> Self {
        Self {
            data,
            freshness: Freshness::Fresh,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.freshness, Freshness::Stale { .. })
    }
}
