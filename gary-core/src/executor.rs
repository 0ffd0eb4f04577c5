//! Retrying request executor
//!
//! Runs one [`RequestSpec`] to completion: header composition, admission
//! through the [`ConcurrencyGate`], a per-attempt deadline, classification of
//! the outcome and linear backoff between transient failures.
//!
//! | Outcome | Retried |
//! |---|---|
//! | 2xx with `{success: true, data}` | returns `data` |
//! | 2xx without the envelope | no, `Format` |
//! | 4xx | no, `Client` |
//! | 5xx | yes, `Server` once exhausted |
//! | connection failure | yes, `Network` once exhausted |
//! | deadline elapsed | no, `Timeout` |

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::{GaryError, Result};
use crate::gate::ConcurrencyGate;
use crate::request::{Envelope, RequestSpec, error_message};
use crate::retry::{RetryPolicy, RetryState};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Header carrying the WordPress REST nonce
pub const NONCE_HEADER: &str = "X-WP-Nonce";

/// Header carrying the client session id
pub const SESSION_HEADER: &str = "X-Gary-AI-Session";

/// Identity attached to a request
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub session_id: String,
    pub token: Option<String>,
}

impl Credentials {
    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            token: None,
        }
    }

    pub fn bearer(session_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            token: Some(token.into()),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    retried_attempts: AtomicU64,
}

/// Request counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    /// Logical calls started
    pub total_requests: u64,
    /// Logical calls that ended in an error
    pub failed_requests: u64,
    /// Physical attempts beyond the first
    pub retried_attempts: u64,
}

/// Executes logical requests with retry, timeout and bounded concurrency
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    gate: ConcurrencyGate,
    base_url: String,
    nonce: Option<String>,
    retry: RetryPolicy,
    counters: Counters,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            gate: ConcurrencyGate::new(config.max_concurrent_requests),
            base_url: config.normalized_base_url().to_string(),
            nonce: config.nonce.clone(),
            retry: RetryPolicy::from_config(config),
            counters: Counters::default(),
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            total_requests: self.counters.total_requests.load(Ordering::SeqCst),
            failed_requests: self.counters.failed_requests.load(Ordering::SeqCst),
            retried_attempts: self.counters.retried_attempts.load(Ordering::SeqCst),
        }
    }

    pub fn reset_stats(&self) {
        self.counters.total_requests.store(0, Ordering::SeqCst);
        self.counters.failed_requests.store(0, Ordering::SeqCst);
        self.counters.retried_attempts.store(0, Ordering::SeqCst);
        self.gate.reset_peak();
    }

    /// Run `spec` and return the envelope's `data`
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        credentials: &Credentials,
    ) -> Result<serde_json::Value> {
        self.counters.total_requests.fetch_add(1, Ordering::SeqCst);

        let result = self.execute_with_retry(spec, credentials).await;
        if let Err(e) = &result {
            self.counters.failed_requests.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                endpoint = spec.endpoint(),
                error = %e,
                "Request failed"
            );
        }
        result
    }

    async fn execute_with_retry(
        &self,
        spec: &RequestSpec,
        credentials: &Credentials,
    ) -> Result<serde_json::Value> {
        let request = self.build_request(spec, credentials)?;
        let mut state = RetryState::new(self.retry.clone().with_max_retries(spec.max_retries()));

        loop {
            let attempt = state.begin_attempt();
            if attempt > 1 {
                self.counters.retried_attempts.fetch_add(1, Ordering::SeqCst);
            }

            let outcome = {
                let _permit = self.gate.acquire().await?;
                self.attempt(spec, request.clone()).await
            };

            match outcome {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() && state.can_retry() => {
                    state.record_failure(e.to_string());
                    let delay = state.next_delay();
                    tracing::warn!(
                        endpoint = spec.endpoint(),
                        attempt,
                        remaining = state.remaining_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if attempt > 1 {
                        tracing::warn!(
                            endpoint = spec.endpoint(),
                            attempts = attempt,
                            previous_error = state.last_error().unwrap_or_default(),
                            error = %e,
                            "Giving up after retries"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One physical attempt, bounded by the spec's timeout
    async fn attempt(&self, spec: &RequestSpec, request: HttpRequest) -> Result<serde_json::Value> {
        let timeout_error = || GaryError::Timeout {
            endpoint: spec.endpoint().to_string(),
            timeout: spec.timeout(),
        };

        let response = match tokio::time::timeout(spec.timeout(), self.transport.send(request)).await
        {
            Err(_) => return Err(timeout_error()),
            Ok(Err(TransportError::Timeout)) => return Err(timeout_error()),
            Ok(Err(TransportError::Network(message))) => return Err(GaryError::Network(message)),
            Ok(Ok(response)) => response,
        };

        classify(response)
    }

    fn build_request(&self, spec: &RequestSpec, credentials: &Credentials) -> Result<HttpRequest> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
            (SESSION_HEADER.to_string(), credentials.session_id.clone()),
        ];

        if let Some(nonce) = &self.nonce {
            headers.push((NONCE_HEADER.to_string(), nonce.clone()));
        }

        if !spec.skips_auth() {
            let token = credentials.token.as_deref().ok_or_else(|| GaryError::Authentication {
                message: format!("No token available for {}", spec.endpoint()),
                source: None,
            })?;
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        Ok(HttpRequest {
            method: spec.method(),
            url: format!("{}{}", self.base_url, spec.endpoint()),
            headers,
            body: spec.body().cloned(),
        })
    }
}

fn classify(response: HttpResponse) -> Result<serde_json::Value> {
    match response.status {
        200..=299 => Envelope::unwrap_data(response.status, &response.body),
        400..=499 => {
            let (message, body) = error_message(&response.body);
            Err(GaryError::Client {
                status: response.status,
                message,
                body,
            })
        }
        500..=599 => {
            let (message, _) = error_message(&response.body);
            Err(GaryError::Server {
                status: response.status,
                message,
            })
        }
        status => Err(GaryError::Format(format!("Unexpected HTTP status {}", status))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ScriptedReply, ScriptedTransport};
    use serde_json::json;
    use std::time::Duration;

    fn config() -> ClientConfig {
        ClientConfig::new("http://wp.test/wp-json/gary-ai/v1")
            .with_nonce("nonce-1")
            .with_max_retries(2)
            .with_retry_base_delay(Duration::from_millis(100))
    }

    fn executor(transport: Arc<ScriptedTransport>, config: &ClientConfig) -> RequestExecutor {
        RequestExecutor::new(transport, config)
    }

    fn creds() -> Credentials {
        Credentials::bearer("session-1", "tok")
    }

    #[tokio::test]
    async fn test_headers_composed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/settings", ScriptedReply::ok(json!({"widget_enabled": true})));
        let config = config();
        let exec = executor(transport.clone(), &config);

        exec.execute(&RequestSpec::get("/settings", &config), &creds())
            .await
            .unwrap();

        let call = &transport.calls()[0];
        assert_eq!(call.url, "http://wp.test/wp-json/gary-ai/v1/settings");
        assert_eq!(call.header("content-type"), Some("application/json"));
        assert_eq!(call.header("accept"), Some("application/json"));
        assert_eq!(call.header(NONCE_HEADER), Some("nonce-1"));
        assert_eq!(call.header(SESSION_HEADER), Some("session-1"));
        assert_eq!(call.header("authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_skip_auth_omits_bearer() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/health", ScriptedReply::ok(json!({"status": "healthy"})));
        let config = config();
        let exec = executor(transport.clone(), &config);

        exec.execute(
            &RequestSpec::get("/health", &config).skip_auth(),
            &Credentials::anonymous("session-1"),
        )
        .await
        .unwrap();

        assert_eq!(transport.calls()[0].header("authorization"), None);
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let config = config();
        let exec = executor(transport.clone(), &config);

        let err = exec
            .execute(
                &RequestSpec::get("/settings", &config),
                &Credentials::anonymous("session-1"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GaryError::Authentication { .. }));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_single_attempt() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/chat", ScriptedReply::error(400, "bad request"));
        let config = config();
        let exec = executor(transport.clone(), &config);

        let err = exec
            .execute(&RequestSpec::post("/chat", json!({}), &config), &creds())
            .await
            .unwrap_err();

        match err {
            GaryError::Client { status, message, body } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad request");
                assert_eq!(body["error"], "bad request");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.call_count("/chat"), 1);
        assert_eq!(exec.stats().failed_requests, 1);
        assert_eq!(exec.stats().retried_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_retried_with_growing_delay() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on("/chat", ScriptedReply::error(500, "boom"))
            .on("/chat", ScriptedReply::error(502, "bad gateway"))
            .on("/chat", ScriptedReply::ok(json!({"response": "hi", "conversation_id": "c1"})));
        let config = config();
        let exec = executor(transport.clone(), &config);

        let data = exec
            .execute(&RequestSpec::post("/chat", json!({}), &config), &creds())
            .await
            .unwrap();

        assert_eq!(data["response"], "hi");
        let calls = transport.calls_to("/chat");
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1].at - calls[0].at;
        let second_gap = calls[2].at - calls[1].at;
        assert!(first_gap >= Duration::from_millis(100));
        assert!(second_gap >= Duration::from_millis(200));
        assert!(second_gap > first_gap);
        assert!(second_gap < Duration::from_millis(250));
        assert_eq!(exec.stats().retried_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_returns_last_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on("/chat", ScriptedReply::network("connection reset"))
            .on("/chat", ScriptedReply::error(503, "unavailable"));
        let config = config();
        let exec = executor(transport.clone(), &config);

        let err = exec
            .execute(&RequestSpec::post("/chat", json!({}), &config), &creds())
            .await
            .unwrap_err();

        assert!(matches!(err, GaryError::Server { status: 503, .. }));
        assert_eq!(transport.call_count("/chat"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failures_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/settings", ScriptedReply::network("connection refused"));
        let config = config();
        let exec = executor(transport.clone(), &config);

        let err = exec
            .execute(&RequestSpec::get("/settings", &config), &creds())
            .await
            .unwrap_err();

        assert!(matches!(err, GaryError::Network(_)));
        assert_eq!(transport.call_count("/settings"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/chat", ScriptedReply::Stall);
        let config = config();
        let exec = executor(transport.clone(), &config);

        let spec = RequestSpec::post("/chat", json!({}), &config)
            .with_timeout(Duration::from_secs(2));
        let started = tokio::time::Instant::now();
        let err = exec.execute(&spec, &creds()).await.unwrap_err();

        assert!(matches!(err, GaryError::Timeout { .. }));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2100));
        assert_eq!(transport.call_count("/chat"), 1);
        assert_eq!(exec.gate().active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_timeout_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/chat", ScriptedReply::TransportTimeout);
        let config = config();
        let exec = executor(transport.clone(), &config);

        let err = exec
            .execute(&RequestSpec::post("/chat", json!({}), &config), &creds())
            .await
            .unwrap_err();

        assert!(matches!(err, GaryError::Timeout { .. }));
        assert_eq!(transport.call_count("/chat"), 1);
    }

    #[tokio::test]
    async fn test_non_json_success_is_format_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/settings", ScriptedReply::text(200, "<html>maintenance</html>"));
        let config = config();
        let exec = executor(transport.clone(), &config);

        let err = exec
            .execute(&RequestSpec::get("/settings", &config), &creds())
            .await
            .unwrap_err();

        assert!(matches!(err, GaryError::Format(_)));
        assert_eq!(transport.call_count("/settings"), 1);
    }

    #[tokio::test]
    async fn test_client_error_with_text_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/settings", ScriptedReply::text(403, "Forbidden"));
        let config = config();
        let exec = executor(transport.clone(), &config);

        let err = exec
            .execute(&RequestSpec::get("/settings", &config), &creds())
            .await
            .unwrap_err();

        match err {
            GaryError::Client { status, message, .. } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redirect_is_format_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/settings", ScriptedReply::text(302, ""));
        let config = config();
        let exec = executor(transport.clone(), &config);

        let err = exec
            .execute(&RequestSpec::get("/settings", &config), &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, GaryError::Format(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_gate() {
        let transport = Arc::new(ScriptedTransport::new().with_latency(Duration::from_millis(50)));
        transport.on("/chat", ScriptedReply::ok(json!({"response": "ok"})));
        let config = config().with_max_concurrent_requests(2);
        let exec = Arc::new(executor(transport.clone(), &config));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let exec = exec.clone();
            let spec = RequestSpec::post("/chat", json!({}), &config);
            handles.push(tokio::spawn(async move { exec.execute(&spec, &creds()).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(transport.call_count("/chat"), 8);
        assert_eq!(transport.peak_in_flight(), 2);
        assert_eq!(exec.gate().peak(), 2);
        assert_eq!(exec.gate().active(), 0);
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/settings", ScriptedReply::ok(json!({})));
        let config = config();
        let exec = executor(transport.clone(), &config);

        // `{}` is a valid (empty) data object
        exec.execute(&RequestSpec::get("/settings", &config), &creds())
            .await
            .unwrap();
        assert_eq!(exec.stats().total_requests, 1);

        exec.reset_stats();
        assert_eq!(exec.stats(), ExecutorStats::default());
    }
}
