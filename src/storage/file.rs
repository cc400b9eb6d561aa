//! JSON-file storage.
//!
//! # Responsibilities
//! - Load the whole key space from a single JSON object at startup
//! - Serve reads from the in-memory mirror
//! - Rewrite the file on every mutation before returning
//!
//! # Design Decisions
//! - Writes go to a temp file and are renamed into place, so a crash
//!   mid-write leaves the previous file intact
//! - The mirror lock is held across the write to keep the file and the
//!   mirror in the same order of mutations

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::storage::durable::{DurableStorage, StorageError};

/// Durable storage backed by one JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, loading existing entries if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        tracing::info!(path = %path.display(), keys = entries.len(), "Durable storage opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_out(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let encoded = serde_json::to_vec(entries)?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, encoded).await?;

        if let Err(rename_err) = fs::rename(&temp_path, &self.path).await {
            // Windows refuses to rename over an existing file.
            match fs::remove_file(&self.path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    let _ = fs::remove_file(&temp_path).await;
                    tracing::error!(path = %self.path.display(), error = %rename_err, "Failed to replace storage file");
                    return Err(err.into());
                }
            }
            fs::rename(&temp_path, &self.path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.write_out(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.write_out(&entries).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), StorageError> {
        let entries = self.entries.lock().await;
        self.write_out(&entries).await
    }
}
