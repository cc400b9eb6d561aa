//! Coalesced per-backend re-login.
//!
//! # Responsibilities
//! - Run at most one re-login per backend at a time
//! - Hand the single outcome to every request that hit `AuthFailed`
//! - Store the new credential, or clear the session when the stored
//!   credentials are definitely wrong
//!
//! # Design Decisions
//! - The pending attempt is a `Shared` future in a per-backend slot; late
//!   joiners await the same handle
//! - A request whose credential was already replaced by a finished attempt
//!   does not start another one; it retries against the new credential
//! - Unreachable or timed-out logins leave the session untouched

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::classify::{RawFailure, ReloginCause};
use crate::facade::events::{AccessEvent, EventBus};
use crate::observability::metrics::record_relogin;
use crate::reauth::strategy::{ReauthError, ReauthStrategy};
use crate::session::{BackendId, SessionStore};

type SharedRelogin = Shared<BoxFuture<'static, Result<(), RawFailure>>>;

/// Whether a backend currently has a re-login in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthState {
    Idle,
    Authenticating,
}

/// Drives automatic re-authentication for every backend.
pub struct ReauthOrchestrator {
    sessions: Arc<SessionStore>,
    strategies: HashMap<BackendId, Arc<dyn ReauthStrategy>>,
    pending: Arc<Mutex<HashMap<BackendId, SharedRelogin>>>,
    timeout: Duration,
    events: EventBus,
}

impl std::fmt::Debug for ReauthOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReauthOrchestrator")
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ReauthOrchestrator {
    pub fn new(sessions: Arc<SessionStore>, timeout: Duration, events: EventBus) -> Self {
        Self {
            sessions,
            strategies: HashMap::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            events,
        }
    }

    /// Register the login sequence for `backend`, replacing any previous one.
    pub fn with_strategy(mut self, backend: BackendId, strategy: Arc<dyn ReauthStrategy>) -> Self {
        self.strategies.insert(backend, strategy);
        self
    }

    pub fn has_strategy(&self, backend: BackendId) -> bool {
        self.strategies.contains_key(&backend)
    }

    pub fn state(&self, backend: BackendId) -> ReauthState {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.contains_key(&backend) {
            ReauthState::Authenticating
        } else {
            ReauthState::Idle
        }
    }

    /// Recover `backend` after a request using credential generation
    /// `observed_generation` was rejected.
    ///
    /// Returns once the session holds a credential newer than the rejected
    /// one, or with a `Relogin` failure describing why it does not.
    pub async fn recover(
        &self,
        backend: BackendId,
        observed_generation: u64,
    ) -> Result<(), RawFailure> {
        if let Err(err) = self.sessions.mark_expired(backend, observed_generation).await {
            tracing::warn!(%backend, error = %err, "Failed to persist expired session");
        }

        let attempt = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(attempt) = pending.get(&backend) {
                tracing::debug!(%backend, "Joining in-flight re-login");
                attempt.clone()
            } else {
                let current = self.sessions.get(backend);
                if current.is_active() && current.generation() != observed_generation {
                    tracing::debug!(%backend, "Credential already refreshed");
                    return Ok(());
                }

                let Some(strategy) = self.strategies.get(&backend).cloned() else {
                    record_relogin(backend, ReloginCause::NoStrategy.as_str());
                    self.events.publish(AccessEvent::ReloginFailed {
                        backend,
                        cause: ReloginCause::NoStrategy,
                    });
                    return Err(RawFailure::Relogin {
                        cause: ReloginCause::NoStrategy,
                        reason: format!("no re-login strategy for {backend}"),
                    });
                };

                tracing::info!(%backend, "Starting re-login");
                let attempt = self.attempt(backend, strategy).boxed().shared();
                pending.insert(backend, attempt.clone());
                attempt
            }
        };

        attempt.await
    }

    fn attempt(
        &self,
        backend: BackendId,
        strategy: Arc<dyn ReauthStrategy>,
    ) -> impl std::future::Future<Output = Result<(), RawFailure>> + Send + 'static {
        let sessions = self.sessions.clone();
        let pending = self.pending.clone();
        let events = self.events.clone();
        let timeout = self.timeout;

        async move {
            let session = sessions.get(backend);
            let outcome = tokio::time::timeout(timeout, strategy.reauthenticate(backend, &session))
                .await
                .unwrap_or_else(|_| {
                    Err(ReauthError::Unreachable(format!(
                        "no response within {}ms",
                        timeout.as_millis()
                    )))
                });

            let result = match outcome {
                Ok(credential) => match sessions.set(backend, credential).await {
                    Ok(_) => Ok(()),
                    Err(err) => Err((ReloginCause::Storage, err.to_string())),
                },
                Err(err @ ReauthError::InvalidCredentials(_)) => {
                    if let Err(clear_err) = sessions.clear(backend).await {
                        tracing::warn!(%backend, error = %clear_err, "Failed to clear rejected session");
                    }
                    events.publish(AccessEvent::SignInRequired { backend });
                    Err((err.cause(), err.to_string()))
                }
                Err(err) => Err((err.cause(), err.to_string())),
            };

            let result = match result {
                Ok(()) => {
                    tracing::info!(%backend, "Re-login succeeded");
                    record_relogin(backend, "succeeded");
                    events.publish(AccessEvent::ReloginSucceeded { backend });
                    Ok(())
                }
                Err((cause, reason)) => {
                    tracing::warn!(%backend, %cause, %reason, "Re-login failed");
                    record_relogin(backend, cause.as_str());
                    events.publish(AccessEvent::ReloginFailed { backend, cause });
                    Err(RawFailure::Relogin { cause, reason })
                }
            };

            pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&backend);
            result
        }
    }
}
