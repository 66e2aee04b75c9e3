//! Request context for calls against the Odoo backend
//!
//! Neither store owns the other; a request needs both the server
//! configuration and the logged-in user's credentials.

use serde::Serialize;

use crate::config::ConfigStore;
use crate::error::{ConfigError, Result, SessionError};
use crate::session::{SessionStore, UserId};

/// Everything needed to address an authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub base_url: String,
    pub database: String,
    pub user_id: Option<UserId>,
    /// `None` while enrichment is pending or after it failed
    pub api_token: Option<String>,
}

impl RequestContext {
    /// Build a context from the current state of both stores
    ///
    /// Fails when the server is not configured or nobody is logged in.
    pub fn current(config: &ConfigStore, session: &SessionStore) -> Result<Self> {
        let server = config.snapshot();
        if !server.is_configured() {
            return Err(ConfigError::NotConfigured.into());
        }

        let state = session.snapshot();
        let user = match (state.is_logged_in(), state.user) {
            (true, Some(user)) => user,
            _ => return Err(SessionError::NotLoggedIn.into()),
        };

        Ok(Self {
            base_url: server.base_url,
            database: server.database,
            user_id: user.user_id(),
            api_token: user.api_token,
        })
    }

    /// Whether requests can carry an API token
    pub fn is_authenticated(&self) -> bool {
        self.api_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{TokenIssuer, TokenResponse};
    use crate::config::MemoryStore;
    use crate::error::Error;
    use crate::session::UserProfile;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StaticIssuer;

    #[async_trait]
    impl TokenIssuer for StaticIssuer {
        async fn fetch_user_api_token(&self, _user_id: UserId) -> Result<TokenResponse> {
            Ok(TokenResponse::new("T", vec!["K1".to_string()]))
        }
    }

    fn stores() -> (ConfigStore, SessionStore) {
        let storage = Arc::new(MemoryStore::new());
        let config = ConfigStore::new(storage.clone());
        let session = SessionStore::new(Arc::new(StaticIssuer), storage);
        (config, session)
    }

    #[tokio::test]
    async fn test_requires_configuration() {
        let (config, session) = stores();
        session.login(UserProfile::new(1, "A")).await;
        let err = RequestContext::current(&config, &session).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_requires_login() {
        let (config, session) = stores();
        config.set_config("http://host/", "db").await;
        let err = RequestContext::current(&config, &session).unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_current_context() {
        let (config, session) = stores();
        config.set_config("http://host/", " db ").await;
        session.login(UserProfile::new(5, "A")).await;

        let ctx = RequestContext::current(&config, &session).unwrap();
        assert_eq!(ctx.base_url, "http://host");
        assert_eq!(ctx.database, "db");
        assert_eq!(ctx.user_id, Some(UserId::new(5)));
        assert!(ctx.is_authenticated());

        session.logout();
        assert!(RequestContext::current(&config, &session).is_err());
    }
}
