//! Logical request description and response envelope

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::{GaryError, Result};

/// HTTP method used by the REST contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical call against the REST API
///
/// A spec may produce several physical attempts but never changes after it
/// is built.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    endpoint: String,
    method: HttpMethod,
    body: Option<serde_json::Value>,
    skip_auth: bool,
    timeout: Duration,
    max_retries: u32,
}

impl RequestSpec {
    /// GET `endpoint` with the configured timeout and retry budget
    pub fn get(endpoint: impl Into<String>, config: &ClientConfig) -> Self {
        Self::new(endpoint, HttpMethod::Get, config)
    }

    /// POST `body` to `endpoint` with the configured timeout and retry budget
    pub fn post(endpoint: impl Into<String>, body: serde_json::Value, config: &ClientConfig) -> Self {
        let mut spec = Self::new(endpoint, HttpMethod::Post, config);
        spec.body = Some(body);
        spec
    }

    fn new(endpoint: impl Into<String>, method: HttpMethod, config: &ClientConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            body: None,
            skip_auth: false,
            timeout: config.request_timeout,
            max_retries: config.max_retries,
        }
    }

    /// Send without the bearer token
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn skips_auth(&self) -> bool {
        self.skip_auth
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// `{success, data}` / `{success, error}` wrapper returned by every endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl Envelope {
    /// Parse a 2xx body and unwrap its `data`
    ///
    /// `success: false` is a terminal rejection carrying the envelope's error.
    pub fn unwrap_data(status: u16, body: &str) -> Result<serde_json::Value> {
        let envelope: Envelope = serde_json::from_str(body)
            .map_err(|e| GaryError::Format(format!("Response is not a valid envelope: {}", e)))?;

        if !envelope.success {
            let raw = serde_json::from_str(body).unwrap_or(serde_json::Value::Null);
            return Err(GaryError::Client {
                status,
                message: envelope
                    .error
                    .as_ref()
                    .and_then(describe_error)
                    .unwrap_or_else(|| "Request was not successful".to_string()),
                body: raw,
            });
        }

        match envelope.data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(GaryError::Format("Successful response has no data".to_string())),
        }
    }
}

/// Extract a human-readable message from an error body
///
/// Accepts `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"message": "..."}`; falls back to the raw text.
pub fn error_message(raw: &str) -> (String, serde_json::Value) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => {
            let message = value
                .get("error")
                .and_then(describe_error)
                .or_else(|| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| raw.to_string());
            (message, value)
        }
        Err(_) => (raw.to_string(), serde_json::Value::String(raw.to_string())),
    }
}

fn describe_error(error: &serde_json::Value) -> Option<String> {
    match error {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}
