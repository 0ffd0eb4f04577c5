//! Error types for Gary AI client operations

use std::time::Duration;

/// Result type for Gary AI client operations
pub type Result<T> = std::result::Result<T, GaryError>;

/// Error types for the Gary AI client
///
/// Transient failures (`Server`, `Network`) are retried by the request
/// executor; everything else is terminal and surfaces on the first attempt.
#[derive(Debug, thiserror::Error)]
pub enum GaryError {
    /// Bad local input, rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token acquisition failed
    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        #[source]
        source: Option<Box<GaryError>>,
    },

    /// The backend rejected the request (4xx or `success: false`)
    #[error("Client error ({status}): {message}")]
    Client {
        status: u16,
        message: String,
        body: serde_json::Value,
    },

    /// The backend failed (5xx), after exhausting retries
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The per-request timeout elapsed
    #[error("Request to {endpoint} timed out after {}ms", .timeout.as_millis())]
    Timeout { endpoint: String, timeout: Duration },

    /// Transport-level failure (connection refused, reset, DNS, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Response body was not the expected envelope or shape
    #[error("Format error: {0}")]
    Format(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Storage adapter failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GaryError {
    /// Build an authentication error wrapping its cause
    pub fn authentication(message: impl Into<String>, source: GaryError) -> Self {
        GaryError::Authentication {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the request executor may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, GaryError::Server { .. } | GaryError::Network(_))
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GaryError::Client { status, .. } | GaryError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the backend refused our credentials (401/403)
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, GaryError::Client { status: 401 | 403, .. })
    }
}
