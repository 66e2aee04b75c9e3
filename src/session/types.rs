//! Core session types
//!
//! Defines the login state model:
//! - `UserProfile` is the user as returned by the backend, plus API credentials
//! - `SessionState` is the snapshot observers see
//! - `LoginOutcome` reports how token enrichment ended

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Backend user identifier (`uid` / `id`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Wrap a raw identifier
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw identifier
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accepts numbers and numeric strings. Odoo's `false` and anything else
/// that is not an identifier reads as absent.
fn deserialize_user_id<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().map(UserId),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok().map(UserId),
        _ => None,
    })
}

/// Treats `null` as an empty list
fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A user as returned by the backend
///
/// Identity fields this crate does not interpret are kept verbatim in
/// `extra` and written back out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(
        default,
        deserialize_with = "deserialize_user_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub uid: Option<UserId>,

    #[serde(
        default,
        deserialize_with = "deserialize_user_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<UserId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Other identity fields (login, partner_id, company_id, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Present only after successful enrichment
    #[serde(default)]
    pub api_token: Option<String>,

    /// Empty unless enrichment succeeded
    #[serde(default, deserialize_with = "deserialize_keys")]
    pub api_keys: Vec<String>,
}

impl UserProfile {
    /// Create a profile with a uid and display name
    pub fn new(uid: i64, name: impl Into<String>) -> Self {
        Self {
            uid: Some(UserId(uid)),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Add an extra identity field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Identifier used for enrichment: `uid`, falling back to `id`
    ///
    /// Zero is not a valid identifier and falls through like a missing one.
    pub fn user_id(&self) -> Option<UserId> {
        let valid = |id: &UserId| id.0 != 0;
        self.uid.filter(valid).or(self.id.filter(valid))
    }

    /// Whether the profile carries an API token
    pub fn has_token(&self) -> bool {
        self.api_token.is_some()
    }

    /// Drop API credentials, keeping identity fields
    pub fn clear_credentials(&mut self) {
        self.api_token = None;
        self.api_keys.clear();
    }

    /// Replace API credentials
    pub fn set_credentials(&mut self, api_token: Option<String>, api_keys: Vec<String>) {
        self.api_token = api_token;
        self.api_keys = api_keys;
    }
}

/// Login phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No user
    #[default]
    LoggedOut,
    /// Logged in, token enrichment not yet resolved
    Pending,
    /// Logged in, enrichment resolved (with or without a token)
    Confirmed,
}

impl SessionPhase {
    /// Whether a user is logged in (pending or confirmed)
    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged out"),
            Self::Pending => write!(f, "logged in (token pending)"),
            Self::Confirmed => write!(f, "logged in"),
        }
    }
}

/// Snapshot of the session, published atomically on every change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub user: Option<UserProfile>,
    /// When the current login started
    pub logged_in_at: Option<DateTime<Utc>>,
    /// Incremented by every login and logout
    #[serde(skip)]
    pub generation: u64,
}

impl SessionState {
    /// Whether a user is logged in
    pub fn is_logged_in(&self) -> bool {
        self.phase.is_logged_in()
    }

    /// Whether enrichment is still running for the current login
    pub fn is_pending(&self) -> bool {
        self.phase == SessionPhase::Pending
    }

    /// API token of the current user, if any
    pub fn api_token(&self) -> Option<&str> {
        self.user.as_ref()?.api_token.as_deref()
    }
}

/// How token enrichment ended for one login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    /// Token and keys merged into the profile
    Enriched,
    /// The backend call failed; the profile is tokenless
    Degraded { reason: String },
    /// The profile had no uid or id, so no call was made
    Skipped,
    /// A later login or logout replaced this session before the call returned
    Superseded,
}

impl fmt::Display for Enrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enriched => write!(f, "enriched"),
            Self::Degraded { reason } => write!(f, "degraded: {}", reason),
            Self::Skipped => write!(f, "skipped (no user id)"),
            Self::Superseded => write!(f, "superseded"),
        }
    }
}

/// Result of a login
///
/// Login never fails from the caller's point of view; this reports what
/// capability the session ended up with.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub enrichment: Enrichment,
    pub persistence: crate::config::Persistence,
    /// Session snapshot taken when this login resolved, or the current one
    /// if it was superseded
    pub state: SessionState,
}

impl LoginOutcome {
    pub(crate) fn new(
        enrichment: Enrichment,
        persistence: crate::config::Persistence,
        state: SessionState,
    ) -> Self {
        Self {
            enrichment,
            persistence,
            state,
        }
    }

    /// Whether the session has an API token
    pub fn has_token(&self) -> bool {
        self.enrichment == Enrichment::Enriched && self.state.api_token().is_some()
    }

    /// Whether the session is running with reduced capability
    pub fn is_degraded(&self) -> bool {
        matches!(self.enrichment, Enrichment::Degraded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_user_id_fallback() {
        let profile: UserProfile = serde_json::from_value(json!({"id": 7, "name": "A"})).unwrap();
        assert_eq!(profile.user_id(), Some(UserId::new(7)));

        let profile: UserProfile =
            serde_json::from_value(json!({"uid": 1, "id": 7, "name": "A"})).unwrap();
        assert_eq!(profile.user_id(), Some(UserId::new(1)));

        let profile: UserProfile = serde_json::from_value(json!({"name": "A"})).unwrap();
        assert_eq!(profile.user_id(), None);
    }

    #[test]
    fn test_zero_uid_falls_back_to_id() {
        let profile: UserProfile = serde_json::from_value(json!({"uid": 0, "id": 7})).unwrap();
        assert_eq!(profile.user_id(), Some(UserId::new(7)));

        let profile: UserProfile = serde_json::from_value(json!({"uid": 0, "id": 0})).unwrap();
        assert_eq!(profile.user_id(), None);
    }

    #[test]
    fn test_user_id_lenient_parsing() {
        let profile: UserProfile = serde_json::from_value(json!({"uid": false})).unwrap();
        assert_eq!(profile.uid, None);

        let profile: UserProfile = serde_json::from_value(json!({"uid": "42"})).unwrap();
        assert_eq!(profile.uid, Some(UserId::new(42)));
    }

    #[test]
    fn test_profile_preserves_extra_fields() {
        let input = json!({
            "uid": 2,
            "name": "Mitchell Admin",
            "username": "admin",
            "partner_id": 3,
            "user_context": {"lang": "en_US"}
        });
        let profile: UserProfile = serde_json::from_value(input).unwrap();
        assert_eq!(profile.extra.get("username"), Some(&json!("admin")));

        let output = serde_json::to_value(&profile).unwrap();
        assert_eq!(
            output,
            json!({
                "uid": 2,
                "name": "Mitchell Admin",
                "username": "admin",
                "partner_id": 3,
                "user_context": {"lang": "en_US"},
                "api_token": null,
                "api_keys": []
            })
        );
    }

    #[test]
    fn test_null_api_keys() {
        let profile: UserProfile =
            serde_json::from_value(json!({"uid": 1, "api_keys": null})).unwrap();
        assert!(profile.api_keys.is_empty());
    }

    #[test]
    fn test_clear_credentials_keeps_identity() {
        let mut profile = UserProfile::new(1, "A").with_field("login", "a@example.com");
        profile.set_credentials(Some("T".to_string()), vec!["K1".to_string()]);
        assert!(profile.has_token());

        profile.clear_credentials();
        assert!(!profile.has_token());
        assert!(profile.api_keys.is_empty());
        assert_eq!(profile.name.as_deref(), Some("A"));
        assert_eq!(profile.extra.get("login"), Some(&json!("a@example.com")));
    }

    #[test]
    fn test_phase_logged_in() {
        assert!(!SessionPhase::LoggedOut.is_logged_in());
        assert!(SessionPhase::Pending.is_logged_in());
        assert!(SessionPhase::Confirmed.is_logged_in());
    }

    #[test]
    fn test_default_state() {
        let state = SessionState::default();
        assert!(!state.is_logged_in());
        assert!(state.user.is_none());
        assert!(state.api_token().is_none());
    }
}
