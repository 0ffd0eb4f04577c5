//! HTTP transport abstraction
//!
//! The request executor talks to the network through [`HttpTransport`], so
//! retry, timeout and concurrency behavior can be exercised without sockets.
//!
//! - [`ReqwestTransport`]: production transport over `reqwest`
//! - [`ScriptedTransport`]: in-process transport with scripted replies

mod http;
pub mod mock;

use async_trait::async_trait;

use crate::request::HttpMethod;

pub use http::ReqwestTransport;
pub use mock::{RecordedCall, ScriptedReply, ScriptedTransport};

/// One physical HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response: status plus undecoded body text
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Failure below the HTTP layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The transport's own deadline fired
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure
    #[error("{0}")]
    Network(String),
}

/// Sends physical HTTP requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}
