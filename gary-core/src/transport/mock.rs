//! Scripted transport for tests
//!
//! Replies are queued per endpoint suffix and consumed in order; the last
//! queued reply for an endpoint is sticky and keeps being served. Every
//! physical call is recorded with its arrival time, and the transport tracks
//! how many calls were in flight at once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::request::HttpMethod;

/// A canned reply for one physical call
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Respond with a JSON body
    Json { status: u16, body: serde_json::Value },
    /// Respond with a raw text body
    Text { status: u16, body: String },
    /// Fail at the connection level
    NetworkFailure(String),
    /// Fail with the transport's own timeout
    TransportTimeout,
    /// Never respond; only the caller's deadline ends the call
    Stall,
}

impl ScriptedReply {
    /// `200 {success: true, data}`
    pub fn ok(data: serde_json::Value) -> Self {
        ScriptedReply::Json {
            status: 200,
            body: json!({ "success": true, "data": data }),
        }
    }

    /// `status {success: false, error}`
    pub fn error(status: u16, message: &str) -> Self {
        ScriptedReply::Json {
            status,
            body: json!({ "success": false, "error": message }),
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        ScriptedReply::Json { status, body }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        ScriptedReply::Text {
            status,
            body: body.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        ScriptedReply::NetworkFailure(message.into())
    }

    /// Token grant body for the `/token` endpoint
    pub fn token(token: &str, expires_in: u64, session_id: &str) -> Self {
        Self::ok(json!({
            "token": token,
            "expires_in": expires_in,
            "session_id": session_id,
        }))
    }
}

/// A physical call observed by the transport
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub at: tokio::time::Instant,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// In-process transport with per-endpoint scripted replies
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<ScriptedReply>)>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a reply for URLs ending in `endpoint`
    pub fn on(&self, endpoint: &str, reply: ScriptedReply) -> &Self {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        match routes.iter_mut().find(|(key, _)| key == endpoint) {
            Some((_, queue)) => queue.push_back(reply),
            None => routes.push((endpoint.to_string(), VecDeque::from([reply]))),
        }
        self
    }

    /// Drop all queued replies for `endpoint`
    pub fn clear(&self, endpoint: &str) {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes.retain(|(key, _)| key != endpoint);
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Calls whose URL ends in `endpoint`
    pub fn calls_to(&self, endpoint: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.url.ends_with(endpoint))
            .collect()
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls_to(endpoint).len()
    }

    /// Highest number of calls observed in flight together
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> ScriptedReply {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let route = routes
            .iter_mut()
            .filter(|(key, _)| url.ends_with(key.as_str()))
            .max_by_key(|(key, _)| key.len());

        match route {
            Some((_, queue)) if queue.len() > 1 => queue.pop_front().unwrap_or(ScriptedReply::Stall),
            Some((_, queue)) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| ScriptedReply::error(404, "No route")),
            None => ScriptedReply::error(404, "No route"),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let reply = self.next_reply(&request.url);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                method: request.method,
                url: request.url,
                headers: request.headers,
                body: request.body,
                at: tokio::time::Instant::now(),
            });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            ScriptedReply::Json { status, body } => Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
            ScriptedReply::Text { status, body } => Ok(HttpResponse { status, body }),
            ScriptedReply::NetworkFailure(message) => Err(TransportError::Network(message)),
            ScriptedReply::TransportTimeout => Err(TransportError::Timeout),
            ScriptedReply::Stall => std::future::pending().await,
        }
    }
}
