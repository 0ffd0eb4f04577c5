//! Payload types exchanged with the widget

use serde::{Deserialize, Serialize};

/// Widget settings served by `/settings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSettings {
    pub widget_enabled: bool,
    pub widget_position: String,
    pub widget_theme: String,
    pub max_conversation_length: u32,
    pub welcome_message: String,
}

impl Default for WidgetSettings {
    /// Settings used whenever the backend cannot be reached
    fn default() -> Self {
        Self {
            widget_enabled: true,
            widget_position: "bottom-right".to_string(),
            widget_theme: "light".to_string(),
            max_conversation_length: 50,
            welcome_message: "Hello! How can I help you today?".to_string(),
        }
    }
}

/// Reply to a chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

/// One message in a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Backend fields this client does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A conversation and its message history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub messages: Vec<ConversationMessage>,
}

/// Result of a health probe; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Why the probe failed, when it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    /// Collapsed failure result
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            status: "unhealthy".to_string(),
            timestamp: None,
            response_time_ms: None,
            error: Some(error.into()),
        }
    }
}
