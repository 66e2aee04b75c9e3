//! Error types for odoo-session
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `Display` and `Error` impls.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for odoo-session
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key-value storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read key '{key}': {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Failed to write key '{key}': {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Storage file is corrupt: {0}")]
    Corrupt(PathBuf),

    #[error("Failed to serialize value for '{key}': {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage is unavailable: {0}")]
    Unavailable(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Server is not configured (base URL and database are required)")]
    NotConfigured,

    #[error("Failed to create config directory: {0}")]
    DirectoryCreationFailed(PathBuf),
}

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("User profile has no uid or id")]
    MissingUserId,
}

/// Backend API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Server reported an error: {0}")]
    Remote(String),

    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;
