//! Key/value storage adapters for session and conversation persistence
//!
//! The client keeps two scopes, mirroring what a browser host offers:
//!
//! - **durable**: survives reloads (the session id lives here)
//! - **session**: lives as long as the host session (conversation state)
//!
//! Hosts may not provide storage at all, or it may fail (private browsing,
//! quota, read-only disk). [`FallbackStore`] absorbs those failures so the
//! client degrades to in-memory operation instead of returning errors.

mod file;
mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;

pub use file::FileStore;
pub use memory::{InMemoryStore, NoopStore};

/// Durable key holding the session id
pub const SESSION_ID_KEY: &str = "gary_ai_session_id";

/// Session-scoped key holding the JSON conversation-state record
pub const CONVERSATION_STATE_KEY: &str = "gary_ai_conversation_state";

/// Pluggable key/value persistence
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// Store wrapper that never fails
///
/// Operations go to the primary store until it reports an error; from then
/// on the wrapper serves everything from an in-memory store. A write that
/// fails is replayed into the in-memory store so the value is not lost.
pub struct FallbackStore {
    name: &'static str,
    primary: Arc<dyn KeyValueStore>,
    fallback: InMemoryStore,
    degraded: AtomicBool,
}

impl FallbackStore {
    pub fn new(name: &'static str, primary: Arc<dyn KeyValueStore>) -> Self {
        Self {
            name,
            primary,
            fallback: InMemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the primary store has failed and memory is in use
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn degrade(&self, operation: &str, error: &crate::error::GaryError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                store = self.name,
                operation,
                error = %error,
                "Storage unavailable, continuing in memory"
            );
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if !self.is_degraded() {
            match self.primary.get(key) {
                Ok(value) => return value,
                Err(e) => self.degrade("get", &e),
            }
        }
        self.fallback.get(key).ok().flatten()
    }

    pub fn set(&self, key: &str, value: &str) {
        if !self.is_degraded() {
            match self.primary.set(key, value) {
                Ok(()) => return,
                Err(e) => self.degrade("set", &e),
            }
        }
        let _ = self.fallback.set(key, value);
    }

    pub fn remove(&self, key: &str) {
        if !self.is_degraded() {
            match self.primary.remove(key) {
                Ok(()) => return,
                Err(e) => self.degrade("remove", &e),
            }
        }
        let _ = self.fallback.remove(key);
    }
}

/// The two storage scopes used by the client
pub struct Storage {
    pub durable: FallbackStore,
    pub session: FallbackStore,
}

impl Storage {
    pub fn new(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self {
            durable: FallbackStore::new("durable", durable),
            session: FallbackStore::new("session", session),
        }
    }

    /// Both scopes in memory only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), Arc::new(InMemoryStore::new()))
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::in_memory()
    }
}
