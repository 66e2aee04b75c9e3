//! HTTP client for the Odoo JSON-RPC endpoints
//!
//! Odoo wraps `type="json"` routes in a JSON-RPC 2.0 envelope: requests
//! carry `{"jsonrpc": "2.0", "method": "call", "params": {...}}` and
//! responses carry either `result` or `error`.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::config::{ConfigStore, Settings};
use crate::error::{ApiError, ConfigError, Result, SessionError};
use crate::session::{UserId, UserProfile};

use super::{TokenIssuer, TokenResponse};

/// Odoo route that opens a web session
pub const AUTHENTICATE_PATH: &str = "/web/session/authenticate";

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: String,
}

impl RpcError {
    /// Odoo puts the useful text (e.g. "Access Denied") under `data.message`
    fn into_message(self) -> String {
        match self.data {
            Some(data) if !data.message.is_empty() => data.message,
            _ => self.message,
        }
    }
}

/// Client for one Odoo server
///
/// The base URL and database are read from the shared [`ConfigStore`] on
/// every call, so a login against a new server takes effect immediately.
/// Cookies are kept so the web session opened by [`authenticate`] carries
/// over to later calls.
///
/// [`authenticate`]: OdooClient::authenticate
#[derive(Debug, Clone)]
pub struct OdooClient {
    http: Client,
    config: ConfigStore,
    token_path: String,
}

impl OdooClient {
    /// Create a client using the given settings
    pub fn new(config: ConfigStore, settings: &Settings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .cookie_store(true)
            .build()
            .map_err(ApiError::from)?;

        Ok(Self {
            http,
            config,
            token_path: settings.token_path.clone(),
        })
    }

    /// Resolve a route against the configured base URL
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base_url = self.config.base_url();
        if base_url.is_empty() {
            return Err(ConfigError::NotConfigured.into());
        }

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let raw = format!("{}{}", base_url, path);

        Url::parse(&raw).map_err(|e| {
            ApiError::InvalidUrl {
                url: raw.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Log in with a username and password against the configured database
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<UserProfile> {
        let database = self.config.database();
        if database.is_empty() {
            return Err(ConfigError::NotConfigured.into());
        }

        let params = json!({
            "db": database,
            "login": login,
            "password": password,
        });

        let session: Value = self
            .call(AUTHENTICATE_PATH, params)
            .await
            .map_err(|e| match e {
                crate::Error::Api(ApiError::Remote(msg)) => {
                    SessionError::AuthenticationFailed(msg).into()
                }
                other => other,
            })?;

        let profile: UserProfile = serde_json::from_value(session)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        // Odoo answers `uid: false` when the credentials are rejected
        if profile.user_id().is_none() {
            return Err(SessionError::AuthenticationFailed(format!(
                "server returned no uid for '{}'",
                login
            ))
            .into());
        }

        debug!("Authenticated '{}' as uid {:?}", login, profile.user_id());
        Ok(profile)
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, params: Value) -> Result<T> {
        let url = self.endpoint(path)?;
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": params,
        });

        debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let rpc: RpcResponse<T> = response.json().await.map_err(ApiError::from)?;
        parse_rpc(rpc)
    }
}

fn parse_rpc<T>(rpc: RpcResponse<T>) -> Result<T> {
    if let Some(error) = rpc.error {
        return Err(ApiError::Remote(error.into_message()).into());
    }
    rpc.result
        .ok_or_else(|| ApiError::InvalidResponse("response has neither result nor error".into()).into())
}

#[async_trait]
impl TokenIssuer for OdooClient {
    #[instrument(skip(self))]
    async fn fetch_user_api_token(&self, user_id: UserId) -> Result<TokenResponse> {
        let params = json!({ "user_id": user_id });
        self.call(&self.token_path, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use std::sync::Arc;

    fn client_with(url: &str, db: &str) -> OdooClient {
        let config = ConfigStore::new(Arc::new(MemoryStore::new()));
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(config.set_config(url, db));
        OdooClient::new(config, &Settings::default()).unwrap()
    }

    #[test]
    fn test_endpoint_requires_configuration() {
        let config = ConfigStore::new(Arc::new(MemoryStore::new()));
        let client = OdooClient::new(config, &Settings::default()).unwrap();
        let err = client.endpoint(AUTHENTICATE_PATH).unwrap_err();
        assert!(matches!(err, crate::Error::Config(ConfigError::NotConfigured)));
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let client = client_with("https://erp.example.com/odoo/", "prod");
        assert_eq!(
            client.endpoint("/api/user/token").unwrap().as_str(),
            "https://erp.example.com/odoo/api/user/token"
        );
        assert_eq!(
            client.endpoint("web/session/authenticate").unwrap().as_str(),
            "https://erp.example.com/odoo/web/session/authenticate"
        );
    }

    #[test]
    fn test_endpoint_invalid_url() {
        let client = client_with("not a url", "prod");
        let err = client.endpoint("/x").unwrap_err();
        assert!(matches!(err, crate::Error::Api(ApiError::InvalidUrl { .. })));
    }

    #[test]
    fn test_parse_rpc_result() {
        let rpc: RpcResponse<TokenResponse> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": null,
            "result": {"api_token": "T", "api_keys": ["K1"]}
        }))
        .unwrap();
        let token = parse_rpc(rpc).unwrap();
        assert_eq!(token, TokenResponse::new("T", vec!["K1".to_string()]));
    }

    #[test]
    fn test_parse_rpc_error_prefers_data_message() {
        let rpc: RpcResponse<Value> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": {"name": "odoo.exceptions.AccessDenied", "message": "Access Denied"}
            }
        }))
        .unwrap();
        let err = parse_rpc(rpc).unwrap_err();
        assert!(matches!(err, crate::Error::Api(ApiError::Remote(ref m)) if m == "Access Denied"));
    }

    #[test]
    fn test_parse_rpc_empty() {
        let rpc: RpcResponse<Value> = serde_json::from_value(json!({"jsonrpc": "2.0"})).unwrap();
        assert!(parse_rpc(rpc).is_err());
    }
}
