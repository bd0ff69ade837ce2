//! Policy enforcement over verification tokens.
//!
//! Every rule runs; violations are collected in a fixed order so the caller
//! sees the full picture. Only the bundle check talks to the backend, and
//! only that check is affected by [`FailMode`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::services::backend::{BackendError, VerificationBackend};
use crate::services::policy::config::{FailMode, PolicyConfig};
use crate::services::token::{self, Claims, MAX_TOKEN_LIFETIME_SECS, TokenError};

/// Why a bundle check came back negative from data the backend did return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleFailure {
    // Token carries no model_digest to compare against.
    NoDigestInToken,
    // Backend has no registered bundle for the model.
    NotRegistered,
    Mismatch { registered: String },
}

/// One policy violation.
///
/// `code()` is the stable machine identifier; `Display` is the
/// human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    UnparseableToken(TokenError),
    Expired,
    ExceedsMaxAge { age: u64, max: u64 },
    ExcessiveLifetime { lifetime: u64 },
    MissingDeploymentId,
    MissingModelDigest,
    BundleVerificationFailed(BundleFailure),
    BundleVerificationUnavailable(String),
    ProviderNotAllowed(String),
    ModelNotAllowed(String),
}

impl Reason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnparseableToken(_) => "unparseable_token",
            Self::Expired => "expired",
            Self::ExceedsMaxAge { .. } => "exceeds_max_age",
            Self::ExcessiveLifetime { .. } => "excessive_lifetime",
            Self::MissingDeploymentId => "missing_deployment_id",
            Self::MissingModelDigest => "missing_model_digest",
            Self::BundleVerificationFailed(_) => "bundle_verification_failed",
            Self::BundleVerificationUnavailable(_) => "bundle_verification_unavailable",
            Self::ProviderNotAllowed(_) => "provider_not_allowed",
            Self::ModelNotAllowed(_) => "model_not_allowed",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnparseableToken(e) => write!(f, "token could not be parsed: {}", e),
            Self::Expired => write!(f, "token has expired"),
            Self::ExceedsMaxAge { age, max } => {
                write!(f, "token is too old: {}s > {}s", age, max)
            }
            Self::ExcessiveLifetime { lifetime } => write!(
                f,
                "token lifetime {}s exceeds the {}s maximum",
                lifetime, MAX_TOKEN_LIFETIME_SECS
            ),
            Self::MissingDeploymentId => {
                write!(f, "deployment id is required but not present in token")
            }
            Self::MissingModelDigest => {
                write!(f, "model digest is required but not present in token")
            }
            Self::BundleVerificationFailed(BundleFailure::NoDigestInToken) => write!(
                f,
                "bundle verification failed: token carries no model digest"
            ),
            Self::BundleVerificationFailed(BundleFailure::NotRegistered) => write!(
                f,
                "bundle verification failed: no bundle registered for model"
            ),
            Self::BundleVerificationFailed(BundleFailure::Mismatch { registered }) => write!(
                f,
                "bundle verification failed: registered digest is {}",
                registered
            ),
            Self::BundleVerificationUnavailable(e) => {
                write!(f, "bundle verification could not be completed: {}", e)
            }
            Self::ProviderNotAllowed(p) => write!(f, "provider '{}' is not in allowed list", p),
            Self::ModelNotAllowed(m) => write!(f, "model '{}' is not in allowed list", m),
        }
    }
}

/// Result of one enforcement call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    allowed: bool,
    reasons: Vec<Reason>,
    claims: Option<Claims>,
}

impl Decision {
    fn new(claims: Option<Claims>, reasons: Vec<Reason>) -> Self {
        Self {
            allowed: reasons.is_empty(),
            reasons,
            claims,
        }
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn reasons(&self) -> &[Reason] {
        &self.reasons
    }

    pub fn reason_codes(&self) -> Vec<&'static str> {
        self.reasons.iter().map(Reason::code).collect()
    }

    pub fn has_reason(&self, code: &str) -> bool {
        self.reasons.iter().any(|r| r.code() == code)
    }

    /// The evaluated claims; `None` only for an unparseable token under fail-open.
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnforceError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("policy evaluation failed during {check}: {source}")]
    PolicyEvaluation {
        check: &'static str,
        #[source]
        source: BackendError,
    },
}

/// Ad-hoc requirements for [`PolicyEnforcer::quick_check`].
#[derive(Debug, Clone, Default)]
pub struct QuickCheck {
    pub require_deployment: bool,
    pub require_digest: bool,
    pub max_age: Option<u64>,
    pub allowed_providers: Vec<String>,
}

impl From<QuickCheck> for PolicyConfig {
    fn from(q: QuickCheck) -> Self {
        let base = PolicyConfig {
            require_deployment_id: q.require_deployment,
            require_model_digest: q.require_digest,
            fail_closed: false,
            ..PolicyConfig::default()
        }
        .with_allowed_providers(q.allowed_providers);

        match q.max_age {
            Some(max) => base.with_max_token_age(max),
            None => base,
        }
    }
}

/// Stateless enforcer. Cheap to clone; safe to share across tasks.
#[derive(Clone)]
pub struct PolicyEnforcer {
    backend: Option<Arc<dyn VerificationBackend>>,
}

impl fmt::Debug for PolicyEnforcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEnforcer")
            .field("backend", &self.backend.as_ref().map(|b| b.backend_name()))
            .finish()
    }
}

impl PolicyEnforcer {
    pub fn new(backend: Arc<dyn VerificationBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Enforcer without a backend. Bundle verification is then always
    /// "unavailable" (an error under fail-closed).
    pub fn offline() -> Self {
        Self { backend: None }
    }

    pub async fn enforce(
        &self,
        policy: &PolicyConfig,
        raw_token: &str,
    ) -> Result<Decision, EnforceError> {
        self.enforce_at(policy, raw_token, chrono::Utc::now().timestamp())
            .await
    }

    /// Same as [`enforce`](Self::enforce) with an explicit clock (unix seconds).
    pub async fn enforce_at(
        &self,
        policy: &PolicyConfig,
        raw_token: &str,
        now: i64,
    ) -> Result<Decision, EnforceError> {
        let mode = policy.fail_mode();

        let claims = match token::parse(raw_token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, ?mode, "verification token could not be parsed");
                return match mode {
                    FailMode::Closed => Err(e.into()),
                    FailMode::Open => Ok(Decision::new(None, vec![Reason::UnparseableToken(e)])),
                };
            }
        };

        let mut reasons = Vec::new();

        if token::is_expired(&claims, now) {
            reasons.push(Reason::Expired);
        }

        let age = token::age(&claims, now);
        if age > policy.max_token_age {
            reasons.push(Reason::ExceedsMaxAge {
                age,
                max: policy.max_token_age,
            });
        }

        if claims.lifetime() > MAX_TOKEN_LIFETIME_SECS {
            reasons.push(Reason::ExcessiveLifetime {
                lifetime: claims.lifetime(),
            });
        }

        if policy.require_deployment_id && claims.deployment_id().is_none() {
            reasons.push(Reason::MissingDeploymentId);
        }

        if policy.require_model_digest && claims.model_digest().is_none() {
            reasons.push(Reason::MissingModelDigest);
        }

        if policy.require_bundle_verification {
            if let Some(reason) = self.check_bundle(&claims, mode).await? {
                reasons.push(reason);
            }
        }

        if !policy.provider_allowed(claims.provider_id()) {
            reasons.push(Reason::ProviderNotAllowed(claims.provider_id().to_string()));
        }

        if !policy.model_allowed(claims.model_id()) {
            reasons.push(Reason::ModelNotAllowed(claims.model_id().to_string()));
        }

        let decision = Decision::new(Some(claims), reasons);
        debug!(
            allowed = decision.allowed(),
            reasons = ?decision.reason_codes(),
            "policy evaluated"
        );
        Ok(decision)
    }

    /// Fail-open evaluation with ad-hoc requirements; any error counts as "no".
    pub async fn quick_check(&self, raw_token: &str, check: QuickCheck) -> bool {
        let policy = PolicyConfig::from(check);
        match self.enforce(&policy, raw_token).await {
            Ok(decision) => decision.allowed(),
            Err(e) => {
                debug!(error = %e, "quick check failed");
                false
            }
        }
    }

    /// `Ok(None)` means the registered bundle matches the token's digest.
    async fn check_bundle(
        &self,
        claims: &Claims,
        mode: FailMode,
    ) -> Result<Option<Reason>, EnforceError> {
        let Some(claimed) = claims.model_digest() else {
            return Ok(Some(Reason::BundleVerificationFailed(
                BundleFailure::NoDigestInToken,
            )));
        };

        let lookup = match &self.backend {
            Some(backend) => backend.registered_digest(claims.model_id()).await,
            None => Err(BackendError::Config("no verification backend configured".to_string())),
        };

        match lookup {
            Ok(Some(registered)) if digests_match(claimed, &registered) => Ok(None),
            Ok(Some(registered)) => Ok(Some(Reason::BundleVerificationFailed(
                BundleFailure::Mismatch { registered },
            ))),
            Ok(None) => Ok(Some(Reason::BundleVerificationFailed(
                BundleFailure::NotRegistered,
            ))),
            Err(e) => {
                warn!(
                    model_id = %claims.model_id(),
                    error = %e,
                    ?mode,
                    "bundle verification unavailable"
                );
                match mode {
                    FailMode::Closed => Err(EnforceError::PolicyEvaluation {
                        check: "bundle_verification",
                        source: e,
                    }),
                    FailMode::Open => {
                        Ok(Some(Reason::BundleVerificationUnavailable(e.to_string())))
                    }
                }
            }
        }
    }
}

fn digests_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
