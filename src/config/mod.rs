//! Configuration and persistence module
//!
//! Handles:
//! - Application settings (`<config_dir>/config.toml`)
//! - Durable key-value storage (`<data_dir>/storage.json`)
//! - The active Odoo server configuration

mod server;
mod settings;
mod storage;

pub use server::*;
pub use settings::*;
pub use storage::*;
