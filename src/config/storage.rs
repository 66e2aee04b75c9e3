//! Durable key-value storage
//!
//! String keys mapped to string values. Structured values (the user
//! profile) are stored as serialized JSON text.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, StorageError};

use super::Settings;

/// Key holding the server base URL
pub const KEY_BASE_URL: &str = "odoo_base_url";

/// Key holding the database name
pub const KEY_DATABASE: &str = "odoo_db";

/// Key holding the serialized user profile
pub const KEY_USER_DATA: &str = "userData";

/// Result of writing a value that the caller keeps in memory regardless
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// The value reached durable storage
    Saved,
    /// The write failed; the value lives only in memory
    Failed { reason: String },
    /// Nothing was written
    Skipped,
}

impl Persistence {
    /// Whether the value reached durable storage
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// Asynchronous durable key-value storage
///
/// Only single-key atomicity is expected from implementations.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` if the key was never written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove a key, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;
}

/// In-process storage, lost when the process exits
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<StdMutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.lock().map(|data| data.len()).unwrap_or(0)
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.data
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()).into())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }
}

/// Storage backed by a single JSON object file
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so readers never observe a half-written file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Create a store at a specific path (the file need not exist yet)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create a store at the location named by the settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(settings.storage_path()?))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
                .into());
            }
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|_| StorageError::Corrupt(self.path.clone()).into())
    }

    async fn store(&self, key: &str, data: &BTreeMap<String, String>) -> Result<()> {
        let write_failed = |reason: String| StorageError::WriteFailed {
            key: key.to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_failed(format!("Failed to create storage directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(data).map_err(|e| StorageError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| write_failed(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| write_failed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let data = self.load(key).await?;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load(key).await?;
        data.insert(key.to_string(), value);
        self.store(key, &data).await?;
        debug!("Wrote key '{}' to {:?}", key, self.path);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load(key).await?;
        let existed = data.remove(key).is_some();
        if existed {
            self.store(key, &data).await?;
        }
        Ok(existed)
    }
}
