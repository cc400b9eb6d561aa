//! Typed, namespaced access to durable storage.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::storage::durable::{DurableStorage, StorageError};

const MAX_KEY_LEN: usize = 128;

/// Reasons a stable key is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("stable key must not be empty")]
    Empty,

    #[error("stable key is {len} characters long, limit is {}", MAX_KEY_LEN)]
    TooLong { len: usize },

    #[error("stable key contains disallowed character {ch:?}")]
    InvalidChar { ch: char },
}

/// An explicit, caller-chosen key that must stay valid across app versions.
///
/// Only ASCII alphanumerics and `- _ . /` are allowed. `:` is reserved as
/// the namespace separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StableKey(String);

impl StableKey {
    /// Validate and wrap `key`.
    pub fn new(key: impl Into<String>) -> Result<Self, KeyError> {
        let key = key.into();
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(KeyError::TooLong { len: key.len() });
        }
        if let Some(ch) = key
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')))
        {
            return Err(KeyError::InvalidChar { ch });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A view of durable storage holding values of one type under one namespace.
pub struct Repository<T> {
    storage: Arc<dyn DurableStorage>,
    namespace: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            namespace: self.namespace,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(storage: Arc<dyn DurableStorage>, namespace: &'static str) -> Self {
        Self {
            storage,
            namespace,
            _marker: PhantomData,
        }
    }

    fn storage_key(&self, key: &StableKey) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Load and decode the value stored under `key`.
    pub async fn get(&self, key: &StableKey) -> Result<Option<T>, StorageError> {
        match self.storage.get(&self.storage_key(key)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encode and store `value` under `key`.
    pub async fn put(&self, key: &StableKey, value: &T) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(value)?;
        self.storage.set(&self.storage_key(key), &encoded).await
    }

    pub async fn remove(&self, key: &StableKey) -> Result<(), StorageError> {
        self.storage.remove(&self.storage_key(key)).await
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        self.storage.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Semester {
        term: String,
        week: u8,
    }

    #[test]
    fn test_key_validation() {
        assert!(StableKey::new("course/2024-fall").is_ok());
        assert_eq!(StableKey::new(""), Err(KeyError::Empty));
        assert_eq!(
            StableKey::new("cache:course"),
            Err(KeyError::InvalidChar { ch: ':' })
        );
        assert_eq!(
            StableKey::new("x".repeat(200)),
            Err(KeyError::TooLong { len: 200 })
        );
    }

    #[tokio::test]
    async fn test_namespaces_do_not_collide() {
        let storage = MemoryStorage::new();
        let shared: Arc<dyn DurableStorage> = Arc::new(storage.clone());
        let semesters: Repository<Semester> = Repository::new(shared.clone(), "semester");
        let labels: Repository<String> = Repository::new(shared, "label");
        let key = StableKey::new("current").unwrap();

        semesters
            .put(&key, &Semester { term: "202401".into(), week: 7 })
            .await
            .unwrap();
        labels.put(&key, &"spring".to_string()).await.unwrap();

        assert!(storage.contains("semester:current"));
        assert!(storage.contains("label:current"));
        assert_eq!(semesters.get(&key).await.unwrap().unwrap().week, 7);

        semesters.remove(&key).await.unwrap();
        assert!(semesters.get(&key).await.unwrap().is_none());
        assert_eq!(labels.get(&key).await.unwrap().as_deref(), Some("spring"));
    }
}
