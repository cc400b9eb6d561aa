//! Pluggable re-login strategies.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::classify::ReloginCause;
use crate::session::{Account, AccountStore, BackendId, Credential, Session};

/// How a re-login attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReauthError {
    /// The backend answered and rejected the stored credentials.
    #[error("credentials rejected: {0}")]
    InvalidCredentials(String),

    /// The login backend could not be reached, timed out, or misbehaved.
    #[error("login backend unreachable: {0}")]
    Unreachable(String),
}

impl ReauthError {
    pub fn cause(&self) -> ReloginCause {
        match self {
            ReauthError::InvalidCredentials(_) => ReloginCause::InvalidCredentials,
            ReauthError::Unreachable(_) => ReloginCause::Unreachable,
        }
    }
}

/// Backend-specific login sequence producing a fresh credential.
#[async_trait]
pub trait ReauthStrategy: Send + Sync {
    async fn reauthenticate(
        &self,
        backend: BackendId,
        session: &Session,
    ) -> Result<Credential, ReauthError>;
}

/// A login performed with a username and password.
///
/// The legacy academic login (captcha fetch, solve, submit) lives behind
/// this trait.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    async fn login(&self, account: &Account) -> Result<Credential, ReauthError>;
}

/// Re-login with the account remembered for the backend.
pub struct StoredAccountStrategy {
    accounts: AccountStore,
    flow: Arc<dyn LoginFlow>,
}

impl StoredAccountStrategy {
    pub fn new(accounts: AccountStore, flow: Arc<dyn LoginFlow>) -> Self {
        Self { accounts, flow }
    }
}

#[async_trait]
impl ReauthStrategy for StoredAccountStrategy {
    async fn reauthenticate(
        &self,
        backend: BackendId,
        _session: &Session,
    ) -> Result<Credential, ReauthError> {
        let account = self
            .accounts
            .get(backend)
            .await
            .map_err(|err| ReauthError::Unreachable(format!("account storage: {err}")))?
            .ok_or_else(|| {
                ReauthError::InvalidCredentials(format!("no stored account for {backend}"))
            })?;

        tracing::debug!(%backend, account = %account.id, "Re-login with stored account");
        self.flow.login(&account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    struct EchoFlow;

    #[async_trait]
    impl LoginFlow for EchoFlow {
        async fn login(&self, account: &Account) -> Result<Credential, ReauthError> {
            if account.password == "right" {
                Ok(Credential::new(format!("JSESSIONID={}", account.id)))
            } else {
                Err(ReauthError::InvalidCredentials("wrong password".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_stored_account_strategy() {
        let accounts = AccountStore::new(Arc::new(MemoryStorage::new()));
        let strategy = StoredAccountStrategy::new(accounts.clone(), Arc::new(EchoFlow));
        let session = Session::anonymous();

        let missing = strategy.reauthenticate(BackendId::Academic, &session).await;
        assert_eq!(missing.unwrap_err().cause(), ReloginCause::InvalidCredentials);

        accounts
            .remember(BackendId::Academic, &Account::new("0231", "right"))
            .await
            .unwrap();
        let credential = strategy
            .reauthenticate(BackendId::Academic, &session)
            .await
            .unwrap();
        assert_eq!(credential.expose(), "JSESSIONID=0231");
    }
}
