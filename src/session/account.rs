//! Stored login accounts for strategies that re-login with a password.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::session::types::BackendId;
use crate::storage::{DurableStorage, Repository, StableKey, StorageError};

/// Username and password for one backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub password: String,
}

impl Account {
    pub fn new(id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Durable store of login accounts, one per backend.
#[derive(Debug, Clone)]
pub struct AccountStore {
    repo: Repository<Account>,
}

impl AccountStore {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            repo: Repository::new(storage, "account"),
        }
    }

    fn key(backend: BackendId) -> Result<StableKey, StorageError> {
        Ok(StableKey::new(backend.as_str())?)
    }

    pub async fn get(&self, backend: BackendId) -> Result<Option<Account>, StorageError> {
        self.repo.get(&Self::key(backend)?).await
    }

    pub async fn remember(&self, backend: BackendId, account: &Account) -> Result<(), StorageError> {
        self.repo.put(&Self::key(backend)?, account).await
    }

    pub async fn forget(&self, backend: BackendId) -> Result<(), StorageError> {
        self.repo.remove(&Self::key(backend)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_remember_and_forget() {
        let storage = MemoryStorage::new();
        let accounts = AccountStore::new(Arc::new(storage.clone()));
        let account = Account::new("102300101", "hunter2");

        accounts.remember(BackendId::Academic, &account).await.unwrap();
        assert!(storage.contains("account:academic"));
        assert_eq!(accounts.get(BackendId::Academic).await.unwrap(), Some(account.clone()));
        assert!(!format!("{account:?}").contains("hunter2"));

        accounts.forget(BackendId::Academic).await.unwrap();
        assert!(accounts.get(BackendId::Academic).await.unwrap().is_none());
    }
}
