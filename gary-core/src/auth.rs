//! Bearer token lifecycle
//!
//! The token is cached in memory only and trusted for
//! `token_refresh_margin * expires_in` seconds. While it is fresh no token
//! request is made; once stale, exactly one refresh runs at a time and
//! concurrent callers wait for its result instead of issuing their own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::error::{GaryError, Result};
use crate::executor::{Credentials, RequestExecutor};
use crate::request::RequestSpec;

/// `data` payload of the `/token` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Acquires, caches and refreshes the bearer token
pub struct TokenManager {
    executor: Arc<RequestExecutor>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
    state: Mutex<TokenState>,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped by `clear`; a refresh started under an older generation is not cached
    generation: AtomicU64,
    refreshes: AtomicU64,
}

impl TokenManager {
    pub fn new(executor: Arc<RequestExecutor>, clock: Arc<dyn Clock>, config: ClientConfig) -> Self {
        Self {
            executor,
            clock,
            config,
            state: Mutex::new(TokenState::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Return a fresh token, fetching one only if the cached token is stale
    ///
    /// # Errors
    ///
    /// Returns [`GaryError::Authentication`] if the token endpoint cannot be
    /// reached, rejects the request, or returns a malformed payload.
    pub async fn get_token(&self, session_id: &str) -> Result<String> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let _refreshing = self.refresh_lock.lock().await;

        // another caller may have refreshed while we waited
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        self.fetch(session_id).await
    }

    /// Discard the cached token and fetch a new one
    pub async fn refresh(&self, session_id: &str) -> Result<String> {
        self.clear();
        let _refreshing = self.refresh_lock.lock().await;
        self.fetch(session_id).await
    }

    /// Forget the cached token
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = TokenState::default();
    }

    /// Whether a token is cached and still inside its validity window
    pub fn is_valid(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(
            (&state.token, state.expires_at),
            (Some(_), Some(expires_at)) if self.clock.now() < expires_at
        )
    }

    /// When the cached token stops being served
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.token.as_ref().and(state.expires_at)
    }

    /// Token requests issued since the last reset
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn reset_refresh_count(&self) {
        self.refreshes.store(0, Ordering::SeqCst);
    }

    fn cached(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match (&state.token, state.expires_at) {
            (Some(token), Some(expires_at)) if self.clock.now() < expires_at => Some(token.clone()),
            (Some(_), _) => {
                tracing::debug!("Cached token expired");
                *state = TokenState::default();
                None
            }
            _ => None,
        }
    }

    async fn fetch(&self, session_id: &str) -> Result<String> {
        let generation = self.generation.load(Ordering::SeqCst);
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        let spec = RequestSpec::post("/token", json!({ "session_id": session_id }), &self.config)
            .skip_auth();

        let data = self
            .executor
            .execute(&spec, &Credentials::anonymous(session_id))
            .await
            .map_err(|e| GaryError::authentication("Token request failed", e))?;

        let grant: TokenGrant = serde_json::from_value(data).map_err(|e| {
            GaryError::authentication(
                "Malformed token response",
                GaryError::Format(e.to_string()),
            )
        })?;

        if grant.token.is_empty() || grant.expires_in == 0 {
            return Err(GaryError::authentication(
                "Malformed token response",
                GaryError::Format("empty token or zero lifetime".to_string()),
            ));
        }

        if let Some(granted_for) = grant.session_id.as_deref() {
            if granted_for != session_id {
                tracing::debug!(
                    requested = session_id,
                    granted_for,
                    "Token issued for a different session id, keeping ours"
                );
            }
        }

        let trusted_ms = (grant.expires_in as f64 * self.config.token_refresh_margin * 1000.0) as i64;
        let expires_at = chrono::Duration::try_milliseconds(trusted_ms)
            .and_then(|lifetime| self.clock.now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                GaryError::authentication(
                    "Malformed token response",
                    GaryError::Format(format!("token lifetime out of range: {}s", grant.expires_in)),
                )
            })?;

        if self.generation.load(Ordering::SeqCst) == generation {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.token = Some(grant.token.clone());
            state.expires_at = Some(expires_at);
        } else {
            tracing::debug!("Auth cleared during refresh, not caching token");
        }

        tracing::debug!(
            expires_in = grant.expires_in,
            trusted_ms,
            "Token refreshed"
        );

        Ok(grant.token)
    }
}
