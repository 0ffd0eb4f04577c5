//! Public API client
//!
//! [`GaryClient`] composes the token manager, the retrying executor and the
//! session coordinator into the operations a chat widget needs. Clients are
//! built explicitly through [`GaryClient::builder`]; clones share one
//! instance, separate builds share nothing.
//!
//! ```no_run
//! use gary_core::prelude::*;
//!
//! # async fn run() -> gary_core::Result<()> {
//! let client = GaryClient::builder()
//!     .config(ClientConfig::new("https://example.com/wp-json/gary-ai/v1"))
//!     .build()?;
//!
//! let reply = client.send_message("Hello", None).await?;
//! println!("{}", reply.response);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::TokenManager;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::{GaryError, Result};
use crate::executor::{Credentials, RequestExecutor};
use crate::models::{ChatReply, Conversation, ConversationMessage, HealthStatus, WidgetSettings};
use crate::request::RequestSpec;
use crate::session::{ConversationState, SessionCoordinator};
use crate::storage::{FileStore, InMemoryStore, KeyValueStore, Storage};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Client counters snapshot, reset by [`GaryClient::destroy`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub retried_attempts: u64,
    pub token_refreshes: u64,
    pub active_requests: usize,
    pub peak_active_requests: usize,
}

#[derive(Deserialize)]
struct ConversationPayload {
    messages: Vec<ConversationMessage>,
}

struct ClientInner {
    config: ClientConfig,
    executor: Arc<RequestExecutor>,
    tokens: Arc<TokenManager>,
    sessions: SessionCoordinator,
}

/// Resilient client for the Gary AI REST API
#[derive(Clone)]
pub struct GaryClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for GaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaryClient")
            .field("base_url", &self.inner.config.base_url)
            .field("session_id", &self.session_id())
            .finish()
    }
}

impl GaryClient {
    pub fn builder() -> GaryClientBuilder {
        GaryClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session_id(&self) -> String {
        self.inner.sessions.session_id()
    }

    /// Whether a token is cached and still fresh
    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.is_valid()
    }

    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.tokens.expires_at()
    }

    pub fn stats(&self) -> ClientStats {
        let executor = self.inner.executor.stats();
        let gate = self.inner.executor.gate();
        ClientStats {
            total_requests: executor.total_requests,
            failed_requests: executor.failed_requests,
            retried_attempts: executor.retried_attempts,
            token_refreshes: self.inner.tokens.refresh_count(),
            active_requests: gate.active(),
            peak_active_requests: gate.peak(),
        }
    }

    pub(crate) fn sessions(&self) -> &SessionCoordinator {
        &self.inner.sessions
    }

    pub(crate) fn tokens(&self) -> &TokenManager {
        &self.inner.tokens
    }

    /// Start a fresh visitor identity; the old token is discarded
    pub fn rotate_session(&self) -> String {
        self.inner.sessions.rotate_session()
    }

    /// The stored conversation metadata, if present and younger than the TTL
    pub fn stored_conversation_state(&self) -> Option<ConversationState> {
        self.inner.sessions.stored_conversation_state()
    }

    /// Fetch widget settings, falling back to [`WidgetSettings::default`]
    ///
    /// Never fails: the widget must render even when the backend is down.
    pub async fn get_settings(&self) -> WidgetSettings {
        let spec = RequestSpec::get("/settings", &self.inner.config);

        let data = match self.execute_authenticated(&spec).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load settings, using defaults");
                return WidgetSettings::default();
            }
        };

        serde_json::from_value(data).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Malformed settings, using defaults");
            WidgetSettings::default()
        })
    }

    /// Send a chat message, optionally continuing `conversation_id`
    ///
    /// # Errors
    ///
    /// Returns [`GaryError::Validation`] without touching the network if
    /// `text` is blank; otherwise any authentication, transport or format
    /// error from the call.
    pub async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatReply> {
        let message = text.trim();
        if message.is_empty() {
            return Err(GaryError::Validation("Message cannot be empty".to_string()));
        }

        let mut body = json!({
            "message": message,
            "session_id": self.session_id(),
        });
        if let Some(id) = conversation_id.filter(|id| !id.trim().is_empty()) {
            body["conversation_id"] = json!(id);
        }

        let spec = RequestSpec::post("/chat", body, &self.inner.config);
        let data = self.execute_authenticated(&spec).await?;

        let reply: ChatReply = serde_json::from_value(data)
            .map_err(|e| GaryError::Format(format!("Malformed chat reply: {}", e)))?;

        let state = self.inner.sessions.record_message(&reply.conversation_id);
        tracing::debug!(
            conversation_id = %reply.conversation_id,
            message_count = state.message_count,
            "Message sent"
        );

        Ok(reply)
    }

    /// Fetch the message history of a conversation
    ///
    /// # Errors
    ///
    /// Returns [`GaryError::Validation`] for a blank id, otherwise any error
    /// from the call.
    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let conversation_id = conversation_id.trim();
        if conversation_id.is_empty() {
            return Err(GaryError::Validation("Conversation id is required".to_string()));
        }

        let endpoint = format!("/conversations/{}", urlencoding::encode(conversation_id));
        let spec = RequestSpec::get(endpoint, &self.inner.config);
        let data = self.execute_authenticated(&spec).await?;

        let payload: ConversationPayload = serde_json::from_value(data)
            .map_err(|e| GaryError::Format(format!("Malformed conversation: {}", e)))?;

        Ok(Conversation {
            conversation_id: conversation_id.to_string(),
            messages: payload.messages,
        })
    }

    /// Probe the backend; every failure collapses into an unhealthy status
    pub async fn check_health(&self) -> HealthStatus {
        let spec = RequestSpec::get("/health", &self.inner.config)
            .skip_auth()
            .with_timeout(self.inner.config.health_timeout)
            .with_max_retries(0);

        let started = tokio::time::Instant::now();
        let result = self
            .inner
            .executor
            .execute(&spec, &Credentials::anonymous(self.session_id()))
            .await;
        let response_time_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(data) => HealthStatus {
                healthy: true,
                status: data
                    .get("status")
                    .and_then(|s| s.as_str())
                    .unwrap_or("healthy")
                    .to_string(),
                timestamp: data
                    .get("timestamp")
                    .and_then(|t| t.as_str())
                    .map(str::to_string),
                response_time_ms: Some(response_time_ms),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, response_time_ms, "Health check failed");
                HealthStatus {
                    response_time_ms: Some(response_time_ms),
                    ..HealthStatus::unhealthy(e.to_string())
                }
            }
        }
    }

    /// Drop cached credentials and conversation state and reset counters
    ///
    /// Safe to call more than once. The session id is kept, so a later call
    /// re-authenticates under the same identity.
    pub fn destroy(&self) {
        self.inner.tokens.clear();
        self.inner.tokens.reset_refresh_count();
        self.inner.sessions.clear_stored_conversation_state();
        self.inner.executor.reset_stats();
        tracing::debug!("Client state cleared");
    }

    /// Run an authenticated call, re-authenticating once on 401/403
    async fn execute_authenticated(&self, spec: &RequestSpec) -> Result<serde_json::Value> {
        let session_id = self.session_id();
        let token = self.inner.tokens.get_token(&session_id).await?;

        match self
            .inner
            .executor
            .execute(spec, &Credentials::bearer(session_id.as_str(), token))
            .await
        {
            Err(e) if e.is_auth_rejection() => {
                tracing::info!(
                    endpoint = spec.endpoint(),
                    status = e.status(),
                    "Token rejected, re-authenticating"
                );
                let token = self.inner.tokens.refresh(&session_id).await?;
                self.inner
                    .executor
                    .execute(spec, &Credentials::bearer(session_id, token))
                    .await
            }
            result => result,
        }
    }
}

/// Builder for [`GaryClient`]
#[derive(Default)]
pub struct GaryClientBuilder {
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    durable_store: Option<Arc<dyn KeyValueStore>>,
    session_store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl GaryClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// HTTP transport; defaults to [`ReqwestTransport`]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Store for the session id; defaults to a [`FileStore`] at
    /// `storage_path` when configured, memory otherwise
    pub fn durable_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.durable_store = Some(store);
        self
    }

    /// Store for conversation state; defaults to memory
    pub fn session_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// # Errors
    ///
    /// Returns [`GaryError::Configuration`] if the configuration is invalid
    /// or the default HTTP transport cannot be created.
    pub fn build(self) -> Result<GaryClient> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let durable = self
            .durable_store
            .unwrap_or_else(|| default_durable_store(&config));
        let session = self
            .session_store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));

        let executor = Arc::new(RequestExecutor::new(transport, &config));
        let tokens = Arc::new(TokenManager::new(
            executor.clone(),
            clock.clone(),
            config.clone(),
        ));
        let sessions = SessionCoordinator::new(
            Storage::new(durable, session),
            clock,
            tokens.clone(),
            config.conversation_ttl,
        );

        tracing::debug!(
            base_url = %config.base_url,
            session_id = %sessions.session_id(),
            "Client created"
        );

        Ok(GaryClient {
            inner: Arc::new(ClientInner {
                config,
                executor,
                tokens,
                sessions,
            }),
        })
    }
}

fn default_durable_store(config: &ClientConfig) -> Arc<dyn KeyValueStore> {
    let Some(path) = &config.storage_path else {
        return Arc::new(InMemoryStore::new());
    };

    match FileStore::open(path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Cannot open storage file, continuing in memory"
            );
            Arc::new(InMemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::SESSION_ID_KEY;
    use crate::transport::{ScriptedReply, ScriptedTransport};
    use std::time::Duration;

    const BASE: &str = "http://wp.test/wp-json/gary-ai/v1";

    fn config() -> ClientConfig {
        ClientConfig::new(BASE)
            .with_nonce("nonce-1")
            .with_max_retries(2)
            .with_retry_base_delay(Duration::from_millis(10))
    }

    fn scripted() -> Arc<ScriptedTransport> {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/token", ScriptedReply::token("abc", 900, "ignored"));
        transport
    }

    fn client(transport: Arc<ScriptedTransport>, config: ClientConfig) -> GaryClient {
        GaryClient::builder()
            .config(config)
            .transport(transport)
            .clock(Arc::new(ManualClock::starting_now()))
            .build()
            .unwrap()
    }

    fn chat_reply(conversation_id: &str) -> ScriptedReply {
        ScriptedReply::ok(json!({"response": "hi", "conversation_id": conversation_id}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_recovers_after_two_server_errors() {
        let transport = scripted();
        transport
            .on("/chat", ScriptedReply::error(500, "boom"))
            .on("/chat", ScriptedReply::error(500, "boom"))
            .on("/chat", chat_reply("c1"));
        let client = client(transport.clone(), config());

        let reply = client.send_message("Hello", None).await.unwrap();

        assert_eq!(reply.response, "hi");
        assert_eq!(transport.call_count("/chat"), 3);
        assert_eq!(client.stats().retried_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_bad_request_single_attempt() {
        let transport = scripted();
        transport.on("/chat", ScriptedReply::error(400, "bad request"));
        let client = client(transport.clone(), config());

        let err = client.send_message("Hello", None).await.unwrap_err();

        assert!(matches!(err, GaryError::Client { status: 400, ref message, .. } if message == "bad request"));
        assert_eq!(transport.call_count("/chat"), 1);
        assert_eq!(client.stored_conversation_state(), None);
    }

    #[tokio::test]
    async fn test_blank_message_rejected_without_network() {
        let transport = scripted();
        let client = client(transport.clone(), config());

        let err = client.send_message("   \n", None).await.unwrap_err();

        assert!(matches!(err, GaryError::Validation(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_chat_request_body() {
        let transport = scripted();
        transport.on("/chat", chat_reply("c9"));
        let client = client(transport.clone(), config());

        client.send_message("  Hello  ", Some("c9")).await.unwrap();

        let call = &transport.calls_to("/chat")[0];
        let body = call.body.as_ref().unwrap();
        assert_eq!(body["message"], "Hello");
        assert_eq!(body["session_id"], client.session_id().as_str());
        assert_eq!(body["conversation_id"], "c9");
        assert_eq!(call.header("authorization"), Some("Bearer abc"));
        assert_eq!(call.header("x-wp-nonce"), Some("nonce-1"));
    }

    #[tokio::test]
    async fn test_new_conversation_omits_id() {
        let transport = scripted();
        transport.on("/chat", chat_reply("c1"));
        let client = client(transport.clone(), config());

        client.send_message("Hello", None).await.unwrap();

        let body = transport.calls_to("/chat")[0].body.clone().unwrap();
        assert!(body.get("conversation_id").is_none());
    }

    #[tokio::test]
    async fn test_message_count_tracks_conversation() {
        let transport = scripted();
        transport
            .on("/chat", chat_reply("c1"))
            .on("/chat", chat_reply("c1"))
            .on("/chat", chat_reply("c2"));
        let client = client(transport.clone(), config());

        client.send_message("one", None).await.unwrap();
        client.send_message("two", Some("c1")).await.unwrap();
        let state = client.stored_conversation_state().unwrap();
        assert_eq!(state.conversation_id, "c1");
        assert_eq!(state.message_count, 2);
        assert_eq!(state.session_id, client.session_id());

        client.send_message("three", None).await.unwrap();
        let state = client.stored_conversation_state().unwrap();
        assert_eq!(state.conversation_id, "c2");
        assert_eq!(state.message_count, 1);
    }

    #[tokio::test]
    async fn test_token_reused_across_calls() {
        let transport = scripted();
        transport.on("/chat", chat_reply("c1"));
        let client = client(transport.clone(), config());

        for _ in 0..3 {
            client.send_message("Hello", None).await.unwrap();
        }

        assert_eq!(transport.call_count("/token"), 1);
        assert!(client.is_authenticated());
        assert!(client.token_expires_at().is_some());
    }

    #[tokio::test]
    async fn test_rejected_token_refreshed_and_replayed_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on("/token", ScriptedReply::token("stale", 900, "s"))
            .on("/token", ScriptedReply::token("fresh", 900, "s"))
            .on("/chat", ScriptedReply::error(401, "invalid token"))
            .on("/chat", chat_reply("c1"));
        let client = client(transport.clone(), config());

        let reply = client.send_message("Hello", None).await.unwrap();

        assert_eq!(reply.conversation_id, "c1");
        let chats = transport.calls_to("/chat");
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].header("authorization"), Some("Bearer stale"));
        assert_eq!(chats[1].header("authorization"), Some("Bearer fresh"));
        assert_eq!(transport.call_count("/token"), 2);
    }

    #[tokio::test]
    async fn test_persistent_rejection_surfaces_after_one_replay() {
        let transport = scripted();
        transport.on("/chat", ScriptedReply::error(403, "forbidden"));
        let client = client(transport.clone(), config());

        let err = client.send_message("Hello", None).await.unwrap_err();

        assert!(err.is_auth_rejection());
        assert_eq!(transport.call_count("/chat"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_default_when_network_down() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on("/token", ScriptedReply::network("connection refused"))
            .on("/settings", ScriptedReply::network("connection refused"));
        let client = client(transport.clone(), config());

        assert_eq!(client.get_settings().await, WidgetSettings::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_default_when_settings_endpoint_fails() {
        let transport = scripted();
        transport.on("/settings", ScriptedReply::error(503, "maintenance"));
        let client = client(transport.clone(), config());

        assert_eq!(client.get_settings().await, WidgetSettings::default());
        assert_eq!(transport.call_count("/settings"), 3);
    }

    #[tokio::test]
    async fn test_settings_from_backend() {
        let transport = scripted();
        transport.on(
            "/settings",
            ScriptedReply::ok(json!({"widget_theme": "dark", "widget_position": "bottom-left"})),
        );
        let client = client(transport, config());

        let settings = client.get_settings().await;
        assert_eq!(settings.widget_theme, "dark");
        assert_eq!(settings.widget_position, "bottom-left");
        assert_eq!(settings.max_conversation_length, 50);
    }

    #[tokio::test]
    async fn test_conversation_id_percent_encoded() {
        let transport = scripted();
        transport.on(
            "/conversations/a%20b%2Fc",
            ScriptedReply::ok(json!({"messages": [{"role": "user", "content": "hey"}]})),
        );
        let client = client(transport.clone(), config());

        let conversation = client.get_conversation("a b/c").await.unwrap();

        assert_eq!(conversation.conversation_id, "a b/c");
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(
            transport.calls_to("/conversations/a%20b%2Fc")[0].url,
            format!("{BASE}/conversations/a%20b%2Fc")
        );
    }

    #[tokio::test]
    async fn test_conversation_requires_id() {
        let transport = scripted();
        let client = client(transport.clone(), config());

        let err = client.get_conversation("").await.unwrap_err();
        assert!(matches!(err, GaryError::Validation(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_conversation_without_messages_is_format_error() {
        let transport = scripted();
        transport.on("/conversations/c1", ScriptedReply::ok(json!({"title": "x"})));
        let client = client(transport, config());

        let err = client.get_conversation("c1").await.unwrap_err();
        assert!(matches!(err, GaryError::Format(_)));
    }

    #[tokio::test]
    async fn test_health_ok() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on(
            "/health",
            ScriptedReply::ok(json!({"status": "healthy", "timestamp": "2026-01-01T00:00:00Z"})),
        );
        let client = client(transport.clone(), config());

        let health = client.check_health().await;

        assert!(health.healthy);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.timestamp.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert!(health.response_time_ms.is_some());
        assert_eq!(transport.calls()[0].header("authorization"), None);
        assert_eq!(transport.call_count("/token"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/health", ScriptedReply::error(500, "db down"));
        let client = client(transport.clone(), config());

        let health = client.check_health().await;

        assert!(!health.healthy);
        assert_eq!(health.status, "unhealthy");
        assert!(health.error.unwrap().contains("db down"));
        assert_eq!(transport.call_count("/health"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_uses_short_timeout() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on("/health", ScriptedReply::Stall);
        let client = client(transport, config());

        let started = tokio::time::Instant::now();
        let health = client.check_health().await;

        assert!(!health.healthy);
        assert!(started.elapsed() < Duration::from_secs(6));
        assert!(health.response_time_ms.unwrap() >= 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sends_respect_limit() {
        let transport = Arc::new(ScriptedTransport::new().with_latency(Duration::from_millis(40)));
        transport
            .on("/token", ScriptedReply::token("abc", 900, "s"))
            .on("/chat", chat_reply("c1"));
        let client = client(transport.clone(), config().with_max_concurrent_requests(2));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move { client.send_message(&format!("msg {i}"), None).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(transport.call_count("/chat"), 6);
        assert!(transport.peak_in_flight() <= 2);
        assert_eq!(client.stats().active_requests, 0);
        assert!(client.stats().peak_active_requests <= 2);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let transport = scripted();
        transport.on("/chat", chat_reply("c1"));
        let client = client(transport.clone(), config());
        client.send_message("Hello", None).await.unwrap();
        let session_id = client.session_id();

        client.destroy();
        client.destroy();

        assert!(!client.is_authenticated());
        assert_eq!(client.stored_conversation_state(), None);
        assert_eq!(client.stats(), ClientStats::default());
        assert_eq!(client.session_id(), session_id);

        client.send_message("again", None).await.unwrap();
        assert_eq!(transport.call_count("/token"), 2);
    }

    #[tokio::test]
    async fn test_clones_share_state_builds_do_not() {
        let transport = scripted();
        transport.on("/chat", chat_reply("c1"));
        let first = client(transport.clone(), config());
        let shared = first.clone();
        let separate = client(transport.clone(), config());

        shared.send_message("Hello", None).await.unwrap();

        assert!(first.is_authenticated());
        assert!(!separate.is_authenticated());
        assert_ne!(first.session_id(), separate.session_id());
    }

    #[tokio::test]
    async fn test_session_id_restored_from_durable_store() {
        let durable = Arc::new(InMemoryStore::new());
        durable.set(SESSION_ID_KEY, "session-42-abcdefghi").unwrap();

        let client = GaryClient::builder()
            .config(config())
            .transport(scripted())
            .durable_store(durable)
            .build()
            .unwrap();

        assert_eq!(client.session_id(), "session-42-abcdefghi");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = GaryClient::builder()
            .config(config().with_max_concurrent_requests(0))
            .transport(scripted())
            .build()
            .unwrap_err();

        assert!(matches!(err, GaryError::Configuration(_)));
    }

    #[test]
    fn test_storage_path_backs_durable_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let first = GaryClient::builder()
            .config(config().with_storage_path(&path))
            .transport(scripted())
            .build()
            .unwrap();
        let reopened = GaryClient::builder()
            .config(config().with_storage_path(&path))
            .transport(scripted())
            .build()
            .unwrap();

        assert!(path.exists());
        assert_eq!(first.session_id(), reopened.session_id());
    }

    #[tokio::test]
    async fn test_rotation_by_another_instance_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let build = || {
            let transport = scripted();
            transport.on("/health", ScriptedReply::ok(json!({"status": "healthy"})));
            GaryClient::builder()
                .config(config().with_storage_path(&path))
                .transport(transport)
                .clock(Arc::new(ManualClock::starting_now()))
                .build()
                .unwrap()
        };
        let a = build();
        let b = build();
        assert_eq!(a.session_id(), b.session_id());

        b.tokens().get_token(&b.session_id()).await.unwrap();
        assert!(!b.needs_reconnection());

        let rotated = a.rotate_session();
        assert!(b.needs_reconnection());

        let result = b.reconnect_session().await;
        assert!(result.success);
        assert_eq!(b.session_id(), rotated);
    }
}
