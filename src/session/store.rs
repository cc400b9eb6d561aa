//! Per-backend session store.
//!
//! # Responsibilities
//! - Serve sessions synchronously from an in-memory mirror
//! - Persist credentials of the backends configured to survive restarts
//! - Reset sessions on logout
//!
//! # Design Decisions
//! - `get` never fails; a missing session is `Anonymous`
//! - `set` awaits the durable write, so a cold start never reads a value
//!   older than the last successful `set`
//! - Only this type mutates sessions; everyone else gets clones

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::now_millis;
use crate::session::types::{BackendId, Credential, CredentialView, Session, SessionState};
use crate::storage::{DurableStorage, Repository, StableKey, StorageError};

const NAMESPACE: &str = "session";

/// Process-wide holder of every backend's session.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<BackendId, Session>,
    repo: Repository<Session>,
    persisted: HashSet<BackendId>,
    generation: AtomicU64,
}

impl SessionStore {
    /// Build the store and restore the sessions of persisted backends.
    pub async fn init(
        storage: Arc<dyn DurableStorage>,
        persisted: impl IntoIterator<Item = BackendId>,
    ) -> Result<Self, StorageError> {
        let store = Self {
            sessions: DashMap::new(),
            repo: Repository::new(storage, NAMESPACE),
            persisted: persisted.into_iter().collect(),
            generation: AtomicU64::new(0),
        };

        let mut restored = 0;
        for backend in BackendId::ALL {
            if !store.is_persisted(backend) {
                continue;
            }
            if let Some(session) = store.repo.get(&Self::key(backend)?).await? {
                let session = session.with_generation(store.next_generation());
                store.sessions.insert(backend, session);
                restored += 1;
            }
        }

        tracing::info!(
            restored,
            persisted = ?store.persisted,
            "Session store initialized"
        );
        Ok(store)
    }

    fn key(backend: BackendId) -> Result<StableKey, StorageError> {
        Ok(StableKey::new(backend.as_str())?)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Whether `backend`'s credential survives restarts.
    pub fn is_persisted(&self, backend: BackendId) -> bool {
        self.persisted.contains(&backend)
    }

    /// Current session for `backend`; `Anonymous` if none.
    pub fn get(&self, backend: BackendId) -> Session {
        self.sessions
            .get(&backend)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot of all sessions for decorating a backend call.
    pub fn view(&self) -> CredentialView {
        let sessions: HashMap<_, _> = self
            .sessions
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        CredentialView::new(sessions)
    }

    /// Store a fresh credential and mark the session `Active`.
    pub async fn set(
        &self,
        backend: BackendId,
        credential: Credential,
    ) -> Result<Session, StorageError> {
        let session = Session::active(credential, now_millis(), self.next_generation());
        self.sessions.insert(backend, session.clone());
        self.persist(backend, &session).await?;
        tracing::debug!(%backend, generation = session.generation(), "Session activated");
        Ok(session)
    }

    /// Mark `backend` expired, unless its credential changed since `observed_generation`.
    ///
    /// Returns whether the state changed.
    pub async fn mark_expired(
        &self,
        backend: BackendId,
        observed_generation: u64,
    ) -> Result<bool, StorageError> {
        let expired = match self.sessions.get_mut(&backend) {
            Some(mut entry)
                if entry.generation() == observed_generation
                    && entry.state() == SessionState::Active =>
            {
                entry.expire();
                Some(entry.clone())
            }
            _ => None,
        };

        match expired {
            Some(session) => {
                self.persist(backend, &session).await?;
                tracing::debug!(%backend, "Session marked expired");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reset `backend` to `Anonymous` and drop its durable entry.
    pub async fn clear(&self, backend: BackendId) -> Result<(), StorageError> {
        self.sessions.remove(&backend);
        if self.is_persisted(backend) {
            self.repo.remove(&Self::key(backend)?).await?;
        }
        tracing::info!(%backend, "Session cleared");
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), StorageError> {
        for backend in BackendId::ALL {
            self.clear(backend).await?;
        }
        Ok(())
    }

    /// Flush durable state before shutdown.
    pub async fn dispose(&self) -> Result<(), StorageError> {
        self.repo.flush().await
    }

    async fn persist(&self, backend: BackendId, session: &Session) -> Result<(), StorageError> {
        if self.is_persisted(backend) {
            self.repo.put(&Self::key(backend)?, session).await?;
        }
        Ok(())
    }
}
