//! Client configuration
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `DOCFLOW_*` environment variables. The result is validated before any
//! client is built from it.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the API base URL
pub const ENV_BASE_URL: &str = "DOCFLOW_API_BASE_URL";
/// Environment variable holding the bearer token
pub const ENV_TOKEN: &str = "DOCFLOW_API_TOKEN";
/// Environment variable overriding the request timeout (seconds)
pub const ENV_REQUEST_TIMEOUT: &str = "DOCFLOW_REQUEST_TIMEOUT_SECS";
/// Environment variable overriding the ERP poll interval (seconds)
pub const ENV_POLL_INTERVAL: &str = "DOCFLOW_POLL_INTERVAL_SECS";
/// Environment variable overriding the ERP poll attempt budget
pub const ENV_POLL_ATTEMPTS: &str = "DOCFLOW_POLL_MAX_ATTEMPTS";

/// ERP archival polling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between two fetches
    pub interval_secs: u64,
    /// Maximum number of fetches
    pub max_attempts: u32,
}

impl PollConfig {
    /// Interval as a duration
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_attempts: 12,
        }
    }
}

/// Query cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached responses
    pub max_entries: u64,
    /// Optional time-to-live in seconds
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl_secs: Some(300),
        }
    }
}

/// docflow client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. `https://dms.example.com/api`
    pub base_url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// ERP archival polling
    pub poll: PollConfig,
    /// Query cache
    pub cache: CacheConfig,
}

impl ClientConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With base URL
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// With bearer token
    #[inline]
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// With ERP polling settings
    #[inline]
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Request timeout as a duration
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// `ApiError::Config` if the text is not valid TOML for this shape
    pub fn from_toml_str(text: &str) -> Result<Self, ApiError> {
        toml::from_str(text).map_err(|e| ApiError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// `ApiError::Config` if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Apply `DOCFLOW_*` overrides from the process environment
    ///
    /// # Errors
    /// `ApiError::Config` if a numeric variable does not parse
    pub fn apply_env(self) -> Result<Self, ApiError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// # Errors
    /// `ApiError::Config` if a numeric variable does not parse
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.token = Some(token);
        }
        if let Some(v) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = parse_var(ENV_REQUEST_TIMEOUT, &v)?;
        }
        if let Some(v) = lookup(ENV_POLL_INTERVAL) {
            self.poll.interval_secs = parse_var(ENV_POLL_INTERVAL, &v)?;
        }
        if let Some(v) = lookup(ENV_POLL_ATTEMPTS) {
            self.poll.max_attempts = parse_var(ENV_POLL_ATTEMPTS, &v)?;
        }
        Ok(self)
    }

    /// Defaults, then `path` if given, then the environment; validated
    ///
    /// # Errors
    /// `ApiError::Config` on unreadable file, bad variables or failed validation
    pub fn load(path: Option<&Path>) -> Result<Self, ApiError> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let config = base.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    /// `ApiError::Config` naming the first offending field
    pub fn validate(&self) -> Result<(), ApiError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ApiError::Config(format!(
                "base_url is empty (set it in the config file or {ENV_BASE_URL})"
            )));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ApiError::Config(format!(
                "base_url must start with http:// or https://, got '{url}'"
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ApiError::Config("request_timeout_secs must be > 0".into()));
        }
        if self.poll.interval_secs == 0 {
            return Err(ApiError::Config("poll.interval_secs must be > 0".into()));
        }
        if self.poll.max_attempts == 0 {
            return Err(ApiError::Config("poll.max_attempts must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            request_timeout_secs: 30,
            poll: PollConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::Config(format!("{name} is not a valid number: '{value}'")))
}
