//! # Gary AI client core
//!
//! Resilient client for the Gary AI chat widget's WordPress REST API:
//! - Bearer token acquisition with caching and single-flight refresh
//! - Bounded request concurrency with FIFO admission
//! - Retries with linear backoff for server and network failures
//! - Per-request timeouts
//! - Session id persistence and conversation resumption
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gary_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = GaryClient::builder()
//!         .config(ClientConfig::load()?)
//!         .build()?;
//!
//!     let settings = client.get_settings().await;
//!     println!("{}", settings.welcome_message);
//!
//!     let reply = client.send_message("Hello", None).await?;
//!     let history = client.get_conversation(&reply.conversation_id).await?;
//!     println!("{} messages", history.messages.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **[`auth`]**: token lifecycle
//! - **[`gate`]**: concurrency limit
//! - **[`executor`]**: header composition, timeout, retry and response classification
//! - **[`session`]**: session id, conversation state, reconnection and resumption
//! - **[`client`]**: the public facade
//! - **[`storage`]** / **[`transport`]** / **[`clock`]**: injectable host services

pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod models;
pub mod request;
pub mod retry;
pub mod session;
pub mod storage;
pub mod transport;

pub use error::{GaryError, Result};

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{ClientStats, GaryClient, GaryClientBuilder};
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::ClientConfig;
    pub use crate::error::{GaryError, Result};
    pub use crate::models::{
        ChatReply, Conversation, ConversationMessage, HealthStatus, WidgetSettings,
    };
    pub use crate::session::{ConversationState, ReconnectResult, ResumeResult};
    pub use crate::storage::{FileStore, InMemoryStore, KeyValueStore, NoopStore};
    pub use crate::transport::{HttpTransport, ReqwestTransport};
}
