//! Session management module
//!
//! Provides the login state model:
//! - `SessionStore` - login/logout and token enrichment
//! - `UserProfile` / `SessionState` - what observers see

mod store;
mod types;

pub use store::*;
pub use types::*;
