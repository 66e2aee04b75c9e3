//! Active Odoo server configuration
//!
//! The in-memory [`ServerConfig`] is the source of truth for the running
//! process. Durable storage is written on every change and read back only
//! by [`ConfigStore::restore_config`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;

use super::{KEY_BASE_URL, KEY_DATABASE, KvStore, Persistence};

/// Server base URL and database name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL without trailing slash
    pub base_url: String,
    /// Database name, trimmed
    pub database: String,
}

impl ServerConfig {
    /// Create a normalized configuration
    pub fn new(base_url: &str, database: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            database: normalize_database(database),
        }
    }

    /// Whether both the URL and database are set
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.database.is_empty()
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_configured() {
            write!(f, "{} (db: {})", self.base_url, self.database)
        } else {
            write!(f, "<not configured>")
        }
    }
}

/// Strip every trailing slash from a server URL
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Trim surrounding whitespace from a database name
pub fn normalize_database(database: &str) -> String {
    database.trim().to_string()
}

/// Process-wide holder of the active server configuration
///
/// Cheap to clone; clones share the same state and storage.
#[derive(Clone)]
pub struct ConfigStore {
    state: Arc<watch::Sender<ServerConfig>>,
    storage: Arc<dyn KvStore>,
}

impl ConfigStore {
    /// Create an empty store backed by the given storage
    pub fn new(storage: Arc<dyn KvStore>) -> Self {
        let (state, _) = watch::channel(ServerConfig::default());
        Self {
            state: Arc::new(state),
            storage,
        }
    }

    /// Set the active configuration and persist it
    ///
    /// The in-memory value is updated before any I/O, so it is correct for
    /// this process even when the returned status reports a failed write.
    #[instrument(skip(self))]
    pub async fn set_config(&self, url: &str, database: &str) -> Persistence {
        let config = ServerConfig::new(url, database);
        self.state.send_replace(config.clone());
        info!("Server configuration set to {}", config);

        match self.persist(&config).await {
            Ok(()) => Persistence::Saved,
            Err(e) => {
                warn!("Failed to persist server configuration: {}", e);
                Persistence::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Current base URL, empty if never set
    pub fn base_url(&self) -> String {
        self.state.borrow().base_url.clone()
    }

    /// Current database name, empty if never set
    pub fn database(&self) -> String {
        self.state.borrow().database.clone()
    }

    /// Current configuration snapshot
    pub fn snapshot(&self) -> ServerConfig {
        self.state.borrow().clone()
    }

    /// Whether both the URL and database are set
    pub fn is_configured(&self) -> bool {
        self.state.borrow().is_configured()
    }

    /// Watch for configuration changes
    pub fn subscribe(&self) -> watch::Receiver<ServerConfig> {
        self.state.subscribe()
    }

    /// Reload the configuration from durable storage
    ///
    /// Keys present in storage overwrite the in-memory values; absent keys
    /// leave them alone. A read failure leaves both values untouched. Returns
    /// the resulting snapshot.
    #[instrument(skip(self))]
    pub async fn restore_config(&self) -> ServerConfig {
        match self.read_stored().await {
            Ok((base_url, database)) => {
                self.state.send_modify(|config| {
                    if let Some(url) = base_url {
                        config.base_url = url;
                    }
                    if let Some(db) = database {
                        config.database = db;
                    }
                });
                debug!("Restored server configuration: {}", *self.state.borrow());
            }
            Err(e) => {
                warn!("Failed to restore server configuration: {}", e);
            }
        }
        self.snapshot()
    }

    /// Writes both keys even if the first fails; reports the first error.
    async fn persist(&self, config: &ServerConfig) -> Result<()> {
        let base_url = self
            .storage
            .set(KEY_BASE_URL, config.base_url.clone())
            .await;
        let database = self
            .storage
            .set(KEY_DATABASE, config.database.clone())
            .await;
        base_url.and(database)
    }

    async fn read_stored(&self) -> Result<(Option<String>, Option<String>)> {
        let base_url = self.storage.get(KEY_BASE_URL).await?;
        let database = self.storage.get(KEY_DATABASE).await?;
        Ok((base_url, database))
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("config", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::error::StorageError;
    use async_trait::async_trait;

    /// Rejects writes to a single key
    struct RejectingKey {
        inner: MemoryStore,
        rejected: &'static str,
    }

    #[async_trait]
    impl KvStore for RejectingKey {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> Result<()> {
            if key == self.rejected {
                return Err(StorageError::WriteFailed {
                    key: key.to_string(),
                    reason: "rejected".to_string(),
                }
                .into());
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<bool> {
            self.inner.remove(key).await
        }
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://host/"), "http://host");
        assert_eq!(normalize_base_url("http://host///"), "http://host");
        assert_eq!(normalize_base_url("http://host/odoo"), "http://host/odoo");
        assert_eq!(normalize_base_url(""), "");
    }

    #[test]
    fn test_normalize_database() {
        assert_eq!(normalize_database("  mydb \n"), "mydb");
        assert_eq!(normalize_database("my db"), "my db");
    }

    #[test]
    fn test_server_config_display() {
        assert_eq!(ServerConfig::default().to_string(), "<not configured>");
        let config = ServerConfig::new("http://host/", " db ");
        assert_eq!(config.to_string(), "http://host (db: db)");
    }

    #[tokio::test]
    async fn test_empty_until_set() {
        let store = ConfigStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(store.base_url(), "");
        assert_eq!(store.database(), "");
        assert!(!store.is_configured());
    }

    #[tokio::test]
    async fn test_set_config_normalizes_and_persists() {
        let storage = MemoryStore::new();
        let store = ConfigStore::new(Arc::new(storage.clone()));

        let status = store.set_config("http://host/", "  mydb ").await;
        assert!(status.is_saved());
        assert_eq!(store.base_url(), "http://host");
        assert_eq!(store.database(), "mydb");

        assert_eq!(
            storage.get(KEY_BASE_URL).await.unwrap().as_deref(),
            Some("http://host")
        );
        assert_eq!(storage.get(KEY_DATABASE).await.unwrap().as_deref(), Some("mydb"));
    }

    #[tokio::test]
    async fn test_restore_only_overwrites_present_keys() {
        let storage = MemoryStore::new();
        storage.set(KEY_DATABASE, "stored-db".to_string()).await.unwrap();

        let store = ConfigStore::new(Arc::new(storage));
        let restored = store.restore_config().await;
        assert_eq!(restored.base_url, "");
        assert_eq!(restored.database, "stored-db");
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let store = ConfigStore::new(Arc::new(MemoryStore::new()));
        let mut rx = store.subscribe();

        store.set_config("https://erp.example.com/", "erp").await;
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen, ServerConfig::new("https://erp.example.com", "erp"));
    }

    #[tokio::test]
    async fn test_database_written_when_url_write_fails() {
        let storage = MemoryStore::new();
        let store = ConfigStore::new(Arc::new(RejectingKey {
            inner: storage.clone(),
            rejected: KEY_BASE_URL,
        }));

        let status = store.set_config("http://host", "mydb").await;
        match status {
            Persistence::Failed { reason } => assert!(reason.contains(KEY_BASE_URL)),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(store.base_url(), "http://host");
        assert_eq!(storage.get(KEY_BASE_URL).await.unwrap(), None);
        assert_eq!(storage.get(KEY_DATABASE).await.unwrap().as_deref(), Some("mydb"));
    }
}
