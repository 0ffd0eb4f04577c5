//! Configuration types for the Gary AI client

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GaryError, Result};

/// Default REST base path exposed by the WordPress plugin
pub const DEFAULT_BASE_URL: &str = "http://localhost/wp-json/gary-ai/v1";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST base URL, e.g. `https://example.com/wp-json/gary-ai/v1`
    pub base_url: String,

    /// Host-supplied CSRF nonce sent as `X-WP-Nonce`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Maximum physical requests in flight at once
    pub max_concurrent_requests: usize,

    /// Per-attempt timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Backoff unit; attempt `n` waits `n * retry_base_delay`
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Upper bound for a single backoff delay
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,

    /// Timeout for the health probe (never retried)
    #[serde(with = "humantime_serde")]
    pub health_timeout: Duration,

    /// Fraction of `expires_in` a token is trusted for (0.0, 1.0]
    pub token_refresh_margin: f64,

    /// How long stored conversation state stays resumable
    #[serde(with = "humantime_serde")]
    pub conversation_ttl: Duration,

    /// Durable storage file (used by file-backed hosts such as the CLI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            nonce: None,
            max_concurrent_requests: 3,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            token_refresh_margin: 0.9,
            conversation_ttl: Duration::from_secs(24 * 60 * 60),
            storage_path: None,
        }
    }
}

impl ClientConfig {
    /// Create a config pointing at the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = delay;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn with_token_refresh_margin(mut self, margin: f64) -> Self {
        self.token_refresh_margin = margin;
        self
    }

    pub fn with_conversation_ttl(mut self, ttl: Duration) -> Self {
        self.conversation_ttl = ttl;
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `gary.toml` in the working directory
    /// 3. The file named by `GARY_CONFIG_PATH`, if set
    /// 4. `GARY_`-prefixed environment variables (`GARY_BASE_URL`, `GARY_NONCE`, ...)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid or the merged
    /// configuration fails validation.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Toml::file("gary.toml"));

        if let Ok(path) = std::env::var("GARY_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: ClientConfig = figment
            .merge(Env::prefixed("GARY_").ignore(&["CONFIG_PATH"]))
            .extract()
            .map_err(|e| {
                GaryError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file, over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: ClientConfig = Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| {
                GaryError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(GaryError::Configuration("base_url must not be empty".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(GaryError::Configuration(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() || self.health_timeout.is_zero() {
            return Err(GaryError::Configuration("timeouts must be non-zero".to_string()));
        }
        if !(self.token_refresh_margin > 0.0 && self.token_refresh_margin <= 1.0) {
            return Err(GaryError::Configuration(format!(
                "token_refresh_margin must be in (0, 1], got {}",
                self.token_refresh_margin
            )));
        }
        // delays grow linearly and must not hit the cap inside the retry budget
        if self.retry_base_delay.is_zero()
            || self.retry_base_delay.saturating_mul(self.max_retries) > self.retry_max_delay
        {
            return Err(GaryError::Configuration(format!(
                "retry_base_delay ({:?}) x max_retries ({}) must be non-zero and within retry_max_delay ({:?})",
                self.retry_base_delay, self.max_retries, self.retry_max_delay
            )));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
