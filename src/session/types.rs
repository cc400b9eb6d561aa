//! Backend identity and per-backend session types.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the independent remote systems the app talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendId {
    /// Primary JSON API (token based).
    Primary,
    /// Legacy educational-administration system (cookie based, scraped).
    Academic,
    /// Single-sign-on proxy (cookie based).
    Sso,
    /// Seat-reservation service (token derived from SSO).
    Booking,
    /// Payment / identity one-code service.
    Identity,
}

impl BackendId {
    pub const ALL: [BackendId; 5] = [
        BackendId::Primary,
        BackendId::Academic,
        BackendId::Sso,
        BackendId::Booking,
        BackendId::Identity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Primary => "primary",
            BackendId::Academic => "academic",
            BackendId::Sso => "sso",
            BackendId::Booking => "booking",
            BackendId::Identity => "identity",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend '{0}'")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendId {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendId::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownBackend(s.to_string()))
    }
}

/// Opaque credential material (token, cookie string, encoded token pair).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    /// The raw credential, for decorating an outgoing request.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Anonymous,
    Active,
    /// The backend rejected the credential; a re-login has not succeeded yet.
    Expired,
}

/// Credential state for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    state: SessionState,
    credential: Option<Credential>,
    /// Unix milliseconds when the credential was obtained.
    obtained_at: Option<u64>,
    /// Bumped on every `set`; not persisted.
    #[serde(skip)]
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
            credential: None,
            obtained_at: None,
            generation: 0,
        }
    }

    pub(crate) fn active(credential: Credential, obtained_at: u64, generation: u64) -> Self {
        Self {
            state: SessionState::Active,
            credential: Some(credential),
            obtained_at: Some(obtained_at),
            generation,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn obtained_at(&self) -> Option<u64> {
        self.obtained_at
    }

    /// Monotonic marker of which credential this is within the process.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn expire(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Expired;
        }
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}

/// Point-in-time copy of every backend's credential, handed to backend calls.
#[derive(Debug, Clone, Default)]
pub struct CredentialView {
    sessions: HashMap<BackendId, Session>,
}

impl CredentialView {
    pub(crate) fn new(sessions: HashMap<BackendId, Session>) -> Self {
        Self { sessions }
    }

    /// Credential for `backend`, if it has one (active or expired).
    pub fn credential(&self, backend: BackendId) -> Option<&Credential> {
        self.sessions.get(&backend).and_then(Session::credential)
    }

    pub fn state(&self, backend: BackendId) -> SessionState {
        self.sessions
            .get(&backend)
            .map(Session::state)
            .unwrap_or(SessionState::Anonymous)
    }

    /// Generation of `backend`'s session at the time the view was taken.
    pub fn generation(&self, backend: BackendId) -> u64 {
        self.sessions.get(&backend).map(Session::generation).unwrap_or(0)
    }
}
