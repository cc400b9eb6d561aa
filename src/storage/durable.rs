//! The durable storage contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::repository::KeyError;

/// Errors raised by durable storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing medium failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A repository key failed validation.
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Simple string-keyed storage that survives process restarts.
///
/// No transactions and no schema. Callers go through
/// [`Repository`](crate::storage::Repository) to get namespacing.
#[async_trait]
pub trait DurableStorage: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`. Returns once the write is durable.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Flush any buffered state to the backing medium.
    async fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
