//! Odoo backend access
//!
//! - [`TokenIssuer`] - the seam the session store uses to enrich a profile
//! - [`OdooClient`] - JSON-RPC over HTTP against a live Odoo server

mod client;

pub use client::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::session::UserId;

/// Response of the token-issuance endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default)]
    pub api_keys: Option<Vec<String>>,

    /// Any truthy value marks the response as failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl TokenResponse {
    /// Successful response carrying a token and keys
    pub fn new(api_token: impl Into<String>, api_keys: Vec<String>) -> Self {
        Self {
            api_token: Some(api_token.into()),
            api_keys: Some(api_keys),
            error: None,
        }
    }

    /// Failed response with the given error payload
    pub fn failed(error: impl Into<Value>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Whether the server flagged this response as an error
    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(is_truthy)
    }

    /// Human-readable error, if any
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            v if is_truthy(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

/// Truthiness of a JSON value: `null`, `false`, `0` and `""` are falsy
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Issues API tokens for a logged-in user
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Fetch the API token and keys for a user
    async fn fetch_user_api_token(&self, user_id: UserId) -> Result<TokenResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_truthiness() {
        assert!(!TokenResponse::new("T", vec![]).is_error());
        assert!(TokenResponse::failed(true).is_error());
        assert!(TokenResponse::failed("boom").is_error());
        assert!(TokenResponse::failed(json!({"code": 1})).is_error());
        assert!(!TokenResponse::failed(false).is_error());
        assert!(!TokenResponse::failed(0).is_error());
        assert!(!TokenResponse::failed("").is_error());
        assert!(!TokenResponse::failed(Value::Null).is_error());
    }

    #[test]
    fn test_parse_token_response() {
        let response: TokenResponse =
            serde_json::from_value(json!({"api_token": "T", "api_keys": ["K1", "K2"]})).unwrap();
        assert_eq!(response.api_token.as_deref(), Some("T"));
        assert_eq!(response.api_keys, Some(vec!["K1".to_string(), "K2".to_string()]));
        assert!(!response.is_error());

        let response: TokenResponse = serde_json::from_value(json!({"error": true})).unwrap();
        assert!(response.is_error());
        assert!(response.api_token.is_none());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            TokenResponse::failed("no key").error_message().as_deref(),
            Some("no key")
        );
        assert_eq!(TokenResponse::failed(true).error_message().as_deref(), Some("true"));
        assert!(TokenResponse::default().error_message().is_none());
    }
}
