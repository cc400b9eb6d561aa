//! The single entry point for backend requests.
//!
//! # Responsibilities
//! - Decorate each call with the current credentials
//! - Classify every failure before it leaves
//! - Recover from `AuthFailed` through the orchestrator and retry once
//! - Serve the last cached value when a cached request fails
//!
//! # Design Decisions
//! - The cache producer is the whole execute path (call, classify, recover,
//!   retry), so coalesced waiters share the recovered result too
//! - A retried request that is rejected again becomes `ReLoginFailed`;
//!   there is no second recovery
//! - Rotated credentials are stored before the value is returned
//! - Any failure may be answered from the cache except rejected stored
//!   credentials, which have to reach the user

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::cache::CacheLayer;
use crate::classify::{Classifier, RawFailure, RejectError, ReloginCause};
use crate::facade::call::{BackendCall, Fetched, Freshness, RequestOptions};
use crate::facade::events::{AccessEvent, EventBus};
use crate::observability::metrics::{record_cache, record_request, CacheResult};
use crate::reauth::ReauthOrchestrator;
use crate::session::{CredentialView, SessionStore};

/// Composes the session store, classifier, orchestrator and cache.
#[derive(Debug, Clone)]
pub struct RequestFacade {
    sessions: Arc<SessionStore>,
    cache: CacheLayer,
    classifier: Arc<Classifier>,
    orchestrator: Arc<ReauthOrchestrator>,
    events: EventBus,
    call_timeout: Duration,
    default_stale_time: Duration,
}

impl RequestFacade {
    pub fn new(
        sessions: Arc<SessionStore>,
        cache: CacheLayer,
        classifier: Arc<Classifier>,
        orchestrator: Arc<ReauthOrchestrator>,
        events: EventBus,
    ) -> Self {
        Self {
            sessions,
            cache,
            classifier,
            orchestrator,
            events,
            call_timeout: Duration::from_secs(5),
            default_stale_time: Duration::ZERO,
        }
    }

    /// Deadline applied to every backend call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Freshness window for cached requests that do not set one.
    pub fn with_default_stale_time(mut self, stale_time: Duration) -> Self {
        self.default_stale_time = stale_time;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Issue `call` with `params`.
    pub async fn request<C: BackendCall>(
        &self,
        call: Arc<C>,
        params: C::Params,
        options: RequestOptions,
    ) -> Result<Fetched<C::Output>, RejectError> {
        let request_id = Uuid::new_v4();
        let backend = call.backend();
        let span = tracing::info_span!(
            "request",
            %request_id,
            %backend,
            call = call.name(),
        );

        async move {
            let result = self.dispatch(call, Arc::new(params), options).await;
            let outcome = match &result {
                Ok(fetched) if fetched.is_stale() => "stale",
                Ok(_) => "ok",
                Err(err) => err.kind().as_str(),
            };
            record_request(backend, outcome);
            match &result {
                Ok(_) => tracing::debug!(outcome, "Request completed"),
                Err(err) => tracing::info!(outcome, error = %err, "Request failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch<C: BackendCall>(
        &self,
        call: Arc<C>,
        params: Arc<C::Params>,
        options: RequestOptions,
    ) -> Result<Fetched<C::Output>, RejectError> {
        let Some(key) = options.cache_key else {
            return self
                .execute(call, params, options.retry_on_auth)
                .await
                .map(Fetched::fresh);
        };

        let stale_time = options.stale_time.unwrap_or(self.default_stale_time);
        let producer = {
            let this = self.clone();
            let call = call.clone();
            let retry_on_auth = options.retry_on_auth;
            move || async move { this.execute(call, params, retry_on_auth).await }
        };

        let err = match self.cache.fetch(&key, stale_time, producer).await {
            Ok(data) => return Ok(Fetched::fresh(data)),
            Err(err) => err,
        };
        if !err.allows_stale_fallback() {
            return Err(err);
        }

        match self.cache.fallback::<C::Output>(&key).await {
            Some(cached) => {
                record_cache(CacheResult::Stale);
                tracing::warn!(
                    %key,
                    error = %err,
                    captured_at_ms = cached.captured_at_ms,
                    "Serving stale cache entry"
                );
                self.events.publish(AccessEvent::StaleServed {
                    backend: call.backend(),
                    call: call.name().to_string(),
                    captured_at_ms: cached.captured_at_ms,
                    cause: err.kind(),
                });
                Ok(Fetched {
                    data: cached.value,
                    freshness: Freshness::Stale {
                        captured_at_ms: cached.captured_at_ms,
                    },
                })
            }
            None => Err(err),
        }
    }

    /// Call, classify, and on `AuthFailed` recover and retry once.
    async fn execute<C: BackendCall>(
        &self,
        call: Arc<C>,
        params: Arc<C::Params>,
        retry_on_auth: bool,
    ) -> Result<C::Output, RejectError> {
        let view = self.sessions.view();
        let backend = match self.attempt(call.as_ref(), &params, &view).await {
            Err(RejectError::AuthFailed { backend }) if retry_on_auth => backend,
            other => return other,
        };

        tracing::info!(%backend, "Credential rejected, recovering session");
        self.orchestrator
            .recover(backend, view.generation(backend))
            .await
            .map_err(|raw| self.classifier.classify(&raw))?;

        let view = self.sessions.view();
        match self.attempt(call.as_ref(), &params, &view).await {
            Err(RejectError::AuthFailed { backend }) => {
                let raw = RawFailure::Relogin {
                    cause: ReloginCause::RetryRejected,
                    reason: format!("{backend} rejected the refreshed credential"),
                };
                Err(self.classifier.classify(&raw))
            }
            other => other,
        }
    }

    async fn attempt<C: BackendCall>(
        &self,
        call: &C,
        params: &C::Params,
        view: &CredentialView,
    ) -> Result<C::Output, RejectError> {
        let raw = tokio::time::timeout(self.call_timeout, call.call(params, view))
            .await
            .unwrap_or_else(|_| Err(RawFailure::timed_out(self.call_timeout)));

        let reply = match raw {
            Ok(reply) => reply,
            Err(raw) => {
                let err = self.classifier.classify(&raw);
                tracing::debug!(kind = err.kind().as_str(), "Backend call failed");
                return Err(err);
            }
        };

        for (backend, credential) in reply.rotated {
            if self.sessions.get(backend).credential() == Some(&credential) {
                continue;
            }
            if let Err(err) = self.sessions.set(backend, credential).await {
                tracing::warn!(%backend, error = %err, "Failed to store rotated credential");
            }
        }
        Ok(reply.value)
    }
}
