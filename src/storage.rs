//! Key-value persistence for settings, counters and suggestions
//!
//! Each key holds one JSON document and is written atomically. There is no
//! cross-key transaction. Read-modify-write sequences hold the store's
//! writer lock ([`Storage::lock`]) from the load to the last save; for
//! [`JsonFileStore`] that lock is an advisory file lock on the state
//! directory, so it also serializes separate processes sharing the directory.

use async_trait::async_trait;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{LabelerError, Result};

pub const SETTINGS_KEY: &str = "settings";
pub const COUNTERS_KEY: &str = "domain_label_counters";
pub const SUGGESTIONS_KEY: &str = "suggestions";

#[async_trait]
pub trait Storage: Send + Sync {
    /// Load the value stored under `key`, or `None` if nothing was saved yet
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value stored under `key`
    async fn save(&self, key: &str, value: Value) -> Result<()>;

    /// Wait for exclusive writer access; released when the guard drops
    ///
    /// Not reentrant: a holder must not call `lock` again.
    async fn lock(&self) -> Result<StoreLock>;
}

/// Held writer lock on a store
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct StoreLock {
    _file: Option<File>,
    _guard: Option<OwnedMutexGuard<()>>,
}

/// Load and deserialize a typed value
pub async fn load_as<T: DeserializeOwned>(store: &dyn Storage, key: &str) -> Result<Option<T>> {
    match store.load(key).await? {
        Some(value) => {
            let typed = serde_json::from_value(value).map_err(|e| {
                LabelerError::StorageError(format!("Corrupt value under '{}': {}", key, e))
            })?;
            Ok(Some(typed))
        }
        None => Ok(None),
    }
}

/// Serialize and save a typed value
pub async fn save_as<T: Serialize>(store: &dyn Storage, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.save(key, value).await
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(LabelerError::StorageError(format!("Invalid storage key '{}'", key)))
    }
}

/// One pretty-printed JSON file per key inside a state directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

/// Lock file inside the state directory; keys cannot start with a dot
const LOCK_FILE: &str = ".lock";

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl Storage for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            tracing::debug!("No stored value for '{}' at {:?}", key, path);
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&path).await?;
        let value = serde_json::from_str(&json).map_err(|e| {
            LabelerError::StorageError(format!("Failed to parse {:?}: {}", path, e))
        })?;
        Ok(Some(value))
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        let json = serde_json::to_string_pretty(&value)?;

        // write-then-rename keeps each key atomic
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!("Saved '{}' to {:?}", key, path);
        Ok(())
    }

    async fn lock(&self) -> Result<StoreLock> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(LOCK_FILE);

        // flock blocks the calling thread
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| LabelerError::StorageError(format!("State lock task failed: {}", e)))??;

        Ok(StoreLock {
            _file: Some(file),
            _guard: None,
        })
    }
}

/// Volatile store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    writer: Arc<AsyncMutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>> {
        self.values
            .lock()
            .map_err(|_| LabelerError::StorageError("Memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        Ok(self.values()?.get(key).cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        validate_key(key)?;
        self.values()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn lock(&self) -> Result<StoreLock> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        Ok(StoreLock {
            _file: None,
            _guard: Some(guard),
        })
    }
}
