//! In-memory storage.
//!
//! Clones share the same map, so handing a clone to a freshly built
//! service simulates a process restart that kept its storage.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::storage::durable::{DurableStorage, StorageError};

/// Storage that lives for as long as any clone of it does.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<DashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Whether `key` currently holds a value.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }
}

#[async_trait]
impl DurableStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key);
        Ok(())
    }
}
