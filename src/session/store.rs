//! Session store - login state and the current user
//!
//! Login is optimistic: the user becomes visible as logged in before the
//! API token is fetched. Enrichment failures never undo a login; they leave
//! the profile without credentials.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::api::TokenIssuer;
use crate::config::{KEY_USER_DATA, KvStore, Persistence};
use crate::error::{Result, StorageError};
use crate::session::{
    Enrichment, LoginOutcome, SessionPhase, SessionState, UserId, UserProfile,
};

/// Process-wide holder of login status and the current user
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    state: Arc<watch::Sender<SessionState>>,
    issuer: Arc<dyn TokenIssuer>,
    storage: Arc<dyn KvStore>,
}

impl SessionStore {
    /// Create a logged-out store
    pub fn new(issuer: Arc<dyn TokenIssuer>, storage: Arc<dyn KvStore>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            state: Arc::new(state),
            issuer,
            storage,
        }
    }

    /// Log a user in and enrich the profile with API credentials
    ///
    /// The logged-in state is published before any network call. Exactly one
    /// token request is made when the profile has a `uid` or `id`. If a newer
    /// login or a logout happens while the request is in flight, its result
    /// is discarded.
    #[instrument(skip(self, user), fields(user_id = ?user.user_id()))]
    pub async fn login(&self, user: UserProfile) -> LoginOutcome {
        let user_id = user.user_id();
        let generation = self.begin(user);
        info!("Logged in (generation {})", generation);

        let Some(user_id) = user_id else {
            debug!("Profile has no uid or id, skipping token enrichment");
            return match self.resolve(generation, UserProfile::clear_credentials) {
                Some(state) => LoginOutcome::new(Enrichment::Skipped, Persistence::Skipped, state),
                None => self.superseded(),
            };
        };

        match self.fetch_token(user_id).await {
            Ok((api_token, api_keys)) => {
                let Some(state) = self.resolve(generation, |profile| {
                    profile.set_credentials(api_token, api_keys)
                }) else {
                    debug!("Session changed during enrichment, discarding token");
                    return self.superseded();
                };

                let persistence = match state.user.as_ref() {
                    Some(profile) => {
                        info!(
                            "Enriched profile with API token ({} keys)",
                            profile.api_keys.len()
                        );
                        self.persist_user(profile).await
                    }
                    None => Persistence::Skipped,
                };
                LoginOutcome::new(Enrichment::Enriched, persistence, state)
            }
            Err(reason) => {
                warn!("Token enrichment failed, continuing without token: {}", reason);
                match self.resolve(generation, UserProfile::clear_credentials) {
                    Some(state) => LoginOutcome::new(
                        Enrichment::Degraded { reason },
                        Persistence::Skipped,
                        state,
                    ),
                    None => self.superseded(),
                }
            }
        }
    }

    /// Log the current user out
    ///
    /// Durable storage is left untouched; see [`forget_user`](Self::forget_user).
    pub fn logout(&self) {
        self.state.send_modify(|state| {
            state.generation += 1;
            state.phase = SessionPhase::LoggedOut;
            state.user = None;
            state.logged_in_at = None;
        });
        info!("Logged out");
    }

    /// Current session snapshot
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Whether a user is logged in (token pending or resolved)
    pub fn is_logged_in(&self) -> bool {
        self.state.borrow().is_logged_in()
    }

    /// Current user, if logged in
    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    /// API token of the current user, if enrichment succeeded
    pub fn api_token(&self) -> Option<String> {
        self.state.borrow().api_token().map(str::to_string)
    }

    /// Watch for session changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait until the current login (if any) is no longer pending
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| !state.is_pending()).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so the channel cannot close here
            Err(_) => self.snapshot(),
        }
    }

    /// Read the last persisted profile without changing login state
    pub async fn restore_user(&self) -> Option<UserProfile> {
        match self.read_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!("Failed to restore user profile: {}", e);
                None
            }
        }
    }

    /// Log out and remove the persisted profile
    ///
    /// Returns whether a stored profile existed.
    pub async fn forget_user(&self) -> Result<bool> {
        self.logout();
        let removed = self.storage.remove(KEY_USER_DATA).await?;
        if removed {
            info!("Removed stored user profile");
        }
        Ok(removed)
    }

    /// Publish the optimistic logged-in state, returning its generation
    fn begin(&self, mut user: UserProfile) -> u64 {
        user.clear_credentials();
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            state.phase = SessionPhase::Pending;
            state.user = Some(user);
            state.logged_in_at = Some(Utc::now());
            generation = state.generation;
        });
        generation
    }

    /// Confirm the login of `generation`, applying `update` to its profile
    ///
    /// Returns the confirmed snapshot, or `None` if the session has moved on.
    fn resolve<F>(&self, generation: u64, update: F) -> Option<SessionState>
    where
        F: FnOnce(&mut UserProfile),
    {
        let mut resolved = None;
        self.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            if let Some(profile) = state.user.as_mut() {
                update(profile);
            }
            state.phase = SessionPhase::Confirmed;
            resolved = Some(state.clone());
            true
        });
        resolved
    }

    /// Call the token endpoint once, folding error responses into `Err`
    async fn fetch_token(
        &self,
        user_id: UserId,
    ) -> std::result::Result<(Option<String>, Vec<String>), String> {
        match self.issuer.fetch_user_api_token(user_id).await {
            Ok(response) if response.is_error() => Err(response
                .error_message()
                .unwrap_or_else(|| "token endpoint reported an error".to_string())),
            Ok(response) => Ok((
                response.api_token,
                response.api_keys.unwrap_or_default(),
            )),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn persist_user(&self, profile: &UserProfile) -> Persistence {
        match self.write_user(profile).await {
            Ok(()) => Persistence::Saved,
            Err(e) => {
                warn!("Failed to persist user profile: {}", e);
                Persistence::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn write_user(&self, profile: &UserProfile) -> Result<()> {
        let json = serde_json::to_string(profile).map_err(|e| StorageError::Serialization {
            key: KEY_USER_DATA.to_string(),
            reason: e.to_string(),
        })?;
        self.storage.set(KEY_USER_DATA, json).await
    }

    async fn read_user(&self) -> Result<Option<UserProfile>> {
        let Some(json) = self.storage.get(KEY_USER_DATA).await? else {
            return Ok(None);
        };
        let profile = serde_json::from_str(&json).map_err(|e| StorageError::Serialization {
            key: KEY_USER_DATA.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(profile))
    }

    fn superseded(&self) -> LoginOutcome {
        LoginOutcome::new(Enrichment::Superseded, Persistence::Skipped, self.snapshot())
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SessionStore")
            .field("phase", &state.phase)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}
