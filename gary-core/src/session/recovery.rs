//! Reconnection and conversation resumption
//!
//! Both workflows report their outcome as a value instead of an error so a
//! widget can show a message and carry on.

use serde::Serialize;

use crate::client::GaryClient;
use crate::models::{Conversation, ConversationMessage};

/// Outcome of [`GaryClient::reconnect_session`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconnectResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
}

/// Outcome of [`GaryClient::resume_conversation`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Conversation>,
    pub messages: Vec<ConversationMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResumeResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            conversation: None,
            messages: Vec::new(),
            error: Some(error.into()),
        }
    }
}

impl GaryClient {
    /// Whether the token is missing/expired or another instance moved the session on
    pub fn needs_reconnection(&self) -> bool {
        self.sessions().needs_reconnection()
    }

    /// Re-establish authentication and confirm the backend is reachable
    ///
    /// Adopts the durably stored session id if it changed underneath us,
    /// discards the current token, fetches a new one and runs a health check.
    pub async fn reconnect_session(&self) -> ReconnectResult {
        let sessions = self.sessions();
        if let Some(adopted) = sessions.adopt_stored_session() {
            tracing::info!(session_id = %adopted, "Reconnecting with stored session");
        }

        self.tokens().clear();
        let session_id = sessions.session_id();

        if let Err(e) = self.tokens().refresh(&session_id).await {
            tracing::warn!(error = %e, "Reconnection failed");
            return ReconnectResult {
                success: false,
                session_id: Some(session_id),
                message: format!("Reconnection failed: {}", e),
            };
        }

        let health = self.check_health().await;
        if !health.healthy {
            let reason = health.error.unwrap_or(health.status);
            tracing::warn!(reason = %reason, "Reconnected but backend is unhealthy");
            return ReconnectResult {
                success: false,
                session_id: Some(session_id),
                message: format!("Backend unhealthy: {}", reason),
            };
        }

        tracing::info!(session_id = %session_id, "Session reconnected");
        ReconnectResult {
            success: true,
            session_id: Some(session_id),
            message: "Session reconnected".to_string(),
        }
    }

    /// Load the history of `conversation_id` so the widget can continue it
    pub async fn resume_conversation(&self, conversation_id: &str) -> ResumeResult {
        if conversation_id.trim().is_empty() {
            return ResumeResult::failed("Conversation id is required");
        }

        match self.get_conversation(conversation_id).await {
            Ok(conversation) => {
                tracing::debug!(
                    conversation_id = %conversation.conversation_id,
                    messages = conversation.messages.len(),
                    "Conversation resumed"
                );
                ResumeResult {
                    success: true,
                    messages: conversation.messages.clone(),
                    conversation: Some(conversation),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "Failed to resume conversation");
                ResumeResult::failed(e.to_string())
            }
        }
    }

    /// Resume whatever conversation the stored state points at
    pub async fn resume_stored_conversation(&self) -> Option<ResumeResult> {
        let state = self.stored_conversation_state()?;
        Some(self.resume_conversation(&state.conversation_id).await)
    }
}
