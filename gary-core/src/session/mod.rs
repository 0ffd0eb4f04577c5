//! Session id lifecycle and conversation-state persistence
//!
//! The session id is generated once, stored in the durable scope and reused
//! across reloads. Whenever it changes (rotation, or adopting an id another
//! instance stored) the cached bearer token is dropped, since tokens are
//! issued per session.
//!
//! Conversation state is a small record in the session scope that lets the
//! widget resume the last conversation after a reload. Records older than
//! the configured TTL (24h by default) are discarded when read.

mod recovery;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::TokenManager;
use crate::clock::Clock;
use crate::storage::{CONVERSATION_STATE_KEY, SESSION_ID_KEY, Storage};

pub use recovery::{ReconnectResult, ResumeResult};

/// Cached metadata about the ongoing conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub session_id: String,
    pub message_count: u32,
    pub last_message_time: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
}

/// Owns the session id and the conversation-state cache
pub struct SessionCoordinator {
    storage: Storage,
    clock: Arc<dyn Clock>,
    tokens: Arc<TokenManager>,
    session_id: RwLock<String>,
    conversation_ttl: Duration,
}

impl SessionCoordinator {
    /// Load the durable session id, generating and storing one if absent
    pub fn new(
        storage: Storage,
        clock: Arc<dyn Clock>,
        tokens: Arc<TokenManager>,
        conversation_ttl: Duration,
    ) -> Self {
        let session_id = match storage.durable.get(SESSION_ID_KEY) {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                let id = generate_session_id(clock.as_ref());
                storage.durable.set(SESSION_ID_KEY, &id);
                tracing::info!(session_id = %id, "Started new session");
                id
            }
        };

        Self {
            storage,
            clock,
            tokens,
            session_id: RwLock::new(session_id),
            conversation_ttl,
        }
    }

    /// The in-memory session id
    pub fn session_id(&self) -> String {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The session id currently in durable storage
    pub fn stored_session_id(&self) -> Option<String> {
        self.storage
            .durable
            .get(SESSION_ID_KEY)
            .filter(|id| !id.trim().is_empty())
    }

    /// Whether durable storage holds a different id (another instance rotated it)
    pub fn has_foreign_session(&self) -> bool {
        self.stored_session_id()
            .is_some_and(|stored| stored != self.session_id())
    }

    /// True if the token is absent/expired or the stored id moved on
    pub fn needs_reconnection(&self) -> bool {
        !self.tokens.is_valid() || self.has_foreign_session()
    }

    /// Switch to the durably stored id if it differs; returns the adopted id
    pub fn adopt_stored_session(&self) -> Option<String> {
        let stored = self.stored_session_id()?;
        if stored == self.session_id() {
            return None;
        }
        tracing::info!(session_id = %stored, "Adopting session id from storage");
        self.replace_session_id(stored.clone());
        Some(stored)
    }

    /// Generate, persist and switch to a new session id
    pub fn rotate_session(&self) -> String {
        let id = generate_session_id(self.clock.as_ref());
        self.storage.durable.set(SESSION_ID_KEY, &id);
        tracing::info!(session_id = %id, "Rotated session");
        self.replace_session_id(id.clone());
        id
    }

    fn replace_session_id(&self, id: String) {
        *self.session_id.write().unwrap_or_else(PoisonError::into_inner) = id;
        self.tokens.clear();
    }

    /// Persist conversation metadata for later resumption
    pub fn store_conversation_state(
        &self,
        conversation_id: &str,
        message_count: u32,
    ) -> ConversationState {
        let now = self.clock.now();
        let state = ConversationState {
            conversation_id: conversation_id.to_string(),
            session_id: self.session_id(),
            message_count,
            last_message_time: now,
            stored_at: now,
        };

        match serde_json::to_string(&state) {
            Ok(json) => self.storage.session.set(CONVERSATION_STATE_KEY, &json),
            Err(e) => tracing::warn!(error = %e, "Failed to encode conversation state"),
        }

        state
    }

    /// Record one more message in `conversation_id`
    ///
    /// The count continues from the stored state when it is the same
    /// conversation and restarts at one otherwise.
    pub fn record_message(&self, conversation_id: &str) -> ConversationState {
        let count = self
            .stored_conversation_state()
            .filter(|state| state.conversation_id == conversation_id)
            .map_or(1, |state| state.message_count.saturating_add(1));
        self.store_conversation_state(conversation_id, count)
    }

    /// Stored conversation metadata, or `None` if absent, unreadable or expired
    pub fn stored_conversation_state(&self) -> Option<ConversationState> {
        let raw = self.storage.session.get(CONVERSATION_STATE_KEY)?;

        let state: ConversationState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable conversation state");
                self.clear_stored_conversation_state();
                return None;
            }
        };

        let age = self.clock.now().signed_duration_since(state.stored_at);
        let ttl = chrono::Duration::from_std(self.conversation_ttl).unwrap_or(chrono::Duration::MAX);
        if age > ttl {
            tracing::debug!(
                conversation_id = %state.conversation_id,
                age_secs = age.num_seconds(),
                "Conversation state expired"
            );
            self.clear_stored_conversation_state();
            return None;
        }

        Some(state)
    }

    pub fn clear_stored_conversation_state(&self) {
        self.storage.session.remove(CONVERSATION_STATE_KEY);
    }
}

/// `session-<unix millis>-<9 char random suffix>`
pub fn generate_session_id(clock: &dyn Clock) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("session-{}-{}", clock.now().timestamp_millis(), &suffix[..9])
}
