//! Application settings
//!
//! Layered configuration: defaults → config file → environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};

/// Default path of the token-issuance endpoint on the Odoo server
pub const DEFAULT_TOKEN_PATH: &str = "/api/user/token";

/// Application settings
///
/// These describe how this process talks to its collaborators. The Odoo
/// server URL and database are not settings; they live in the
/// [`ConfigStore`](super::ConfigStore) and are chosen at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path of the durable key-value storage file
    pub storage_path: Option<PathBuf>,

    /// Path of the token-issuance endpoint, relative to the server base URL
    pub token_path: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Enable debug logging
    pub debug: bool,

    /// Log file path (if set, logs to file instead of stderr)
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_path: None,
            token_path: DEFAULT_TOKEN_PATH.to_string(),
            request_timeout_secs: 30,
            debug: false,
            log_file: None,
        }
    }
}

impl Settings {
    /// Load settings from all sources
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        Self::load_from(&config_path)
    }

    /// Load settings using a specific config file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let settings: Settings = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer config file if it exists
            .merge(Toml::file(config_path))
            // Layer environment variables (ODOO_SESSION_TOKEN_PATH, etc.)
            .merge(Env::prefixed("ODOO_SESSION_"))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        Ok(settings)
    }

    /// Get the configuration file path
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Get the storage file path
    pub fn storage_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.storage_path {
            Ok(path.clone())
        } else {
            Ok(Self::data_dir()?.join("storage.json"))
        }
    }

    /// HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Save current settings to the default config file
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_file_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save current settings to a specific file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|_e| {
                Error::Config(ConfigError::DirectoryCreationFailed(parent.to_path_buf()))
            })?;
        }

        let toml =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        std::fs::write(config_path, toml).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "odoo-session", "odoo-session").ok_or_else(|| {
            Error::Config(ConfigError::LoadFailed(
                "Could not determine home directory".to_string(),
            ))
        })
    }
}
