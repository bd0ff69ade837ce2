/*
 * Responsibility
 * - Verification backend settings (base URL, API key, timeout, retry budget)
 * - Loading them from the environment (.env supported), failing on bad values
 */
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::services::backend::RetryPolicy;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
    // Per-request timeout; a timeout counts as "unavailable".
    pub timeout: Duration,
    // Total attempts for idempotent lookups. Binding is always a single attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the API key
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .finish()
    }
}

impl BackendConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_backoff)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("MODELSIGNATURE_BASE_URL")
            .map_err(|_| ConfigError::Missing("MODELSIGNATURE_BASE_URL"))?;
        let base_url =
            Url::parse(&base_url).map_err(|_| ConfigError::Invalid("MODELSIGNATURE_BASE_URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid("MODELSIGNATURE_BASE_URL"));
        }

        let api_key = std::env::var("MODELSIGNATURE_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let timeout_seconds = parse_or("MODELSIGNATURE_TIMEOUT_SECONDS", 10u64)?;
        if timeout_seconds == 0 {
            return Err(ConfigError::Invalid("MODELSIGNATURE_TIMEOUT_SECONDS"));
        }

        let max_retries = parse_or("MODELSIGNATURE_MAX_RETRIES", 3u32)?;
        let backoff_millis = parse_or("MODELSIGNATURE_BACKOFF_MILLIS", 1_000u64)?;

        Ok(Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(timeout_seconds),
            max_retries,
            initial_backoff: Duration::from_millis(backoff_millis),
        })
    }
}

// Unset falls back to `default`; set-but-unparseable is an error.
fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}
