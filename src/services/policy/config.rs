use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::services::token::MAX_TOKEN_LIFETIME_SECS;

/// How infrastructure failures during a required backend check are handled.
///
/// Never affects violations found in data the backend actually returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    // Abort the evaluation with an error.
    Closed,
    // Record an "unavailable" reason and keep evaluating.
    Open,
}

/// Trust requirements a relying party enforces before accepting a token.
///
/// Built once and shared read-only across enforcement calls. Every field has
/// a default, so a partial TOML/JSON/YAML document deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub require_deployment_id: bool,
    pub require_model_digest: bool,
    // Registered bundle digest at the backend must match `model_digest`.
    pub require_bundle_verification: bool,
    // Empty = any provider.
    pub allowed_providers: BTreeSet<String>,
    // Empty = any model.
    pub allowed_models: BTreeSet<String>,
    // Ceiling on (now - issued_at), on top of the token's own `exp`.
    pub max_token_age: u64,
    pub fail_closed: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            require_deployment_id: false,
            require_model_digest: false,
            require_bundle_verification: false,
            allowed_providers: BTreeSet::new(),
            allowed_models: BTreeSet::new(),
            max_token_age: MAX_TOKEN_LIFETIME_SECS,
            fail_closed: true,
        }
    }
}

impl PolicyConfig {
    /// Production profile: every requirement on, fail closed, 5 minute age ceiling.
    pub fn secure() -> Self {
        Self {
            require_deployment_id: true,
            require_model_digest: true,
            require_bundle_verification: true,
            max_token_age: 300,
            fail_closed: true,
            ..Self::default()
        }
    }

    /// Development profile: no requirements, fail open, 1 hour age ceiling.
    pub fn lenient() -> Self {
        Self {
            require_deployment_id: false,
            require_model_digest: false,
            require_bundle_verification: false,
            max_token_age: 3_600,
            fail_closed: false,
            ..Self::default()
        }
    }

    pub fn with_allowed_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_providers = providers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_token_age(mut self, seconds: u64) -> Self {
        self.max_token_age = seconds;
        self
    }

    pub fn fail_mode(&self) -> FailMode {
        if self.fail_closed {
            FailMode::Closed
        } else {
            FailMode::Open
        }
    }

    pub fn provider_allowed(&self, provider_id: &str) -> bool {
        self.allowed_providers.is_empty() || self.allowed_providers.contains(provider_id)
    }

    pub fn model_allowed(&self, model_id: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.contains(model_id)
    }
}
