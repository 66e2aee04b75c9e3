//! Odoo Session - session and server configuration core for Odoo ERP clients
//!
//! This crate holds the state a client application needs before it can talk
//! to an Odoo server: which server and database to use, who is logged in,
//! and the API token issued to that user.
//!
//! # Architecture
//!
//! Two independent stores, shared by cloning:
//! - **ConfigStore** - active base URL and database, persisted on every change
//! - **SessionStore** - login state and user profile, enriched with an API
//!   token after login
//!
//! Both publish every change as a single snapshot through a
//! `tokio::sync::watch` channel.
//!
//! # Modules
//!
//! - [`config`] - Settings, durable key-value storage and the `ConfigStore`
//! - [`session`] - The `SessionStore` and user profile types
//! - [`api`] - Token issuance seam and the Odoo JSON-RPC client
//! - [`context`] - Request context assembled from both stores
//! - [`error`] - Error types

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod session;

pub use api::{OdooClient, TokenIssuer, TokenResponse};
pub use config::{ConfigStore, FileStore, KvStore, MemoryStore, Persistence, ServerConfig, Settings};
pub use context::RequestContext;
pub use error::{Error, Result};
pub use session::{
    Enrichment, LoginOutcome, SessionPhase, SessionState, SessionStore, UserId, UserProfile,
};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
