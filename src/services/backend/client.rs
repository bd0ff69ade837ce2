//! Verification backend interface used by the enforcer and the binder.
use async_trait::async_trait;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

/// Backend-layer errors.
///
/// Kept independent from the enforcer/binder errors so each caller decides
/// how to fail (fail-closed or fail-open for bundle checks, always surfaced
/// for binding).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Transport failure, timeout, rate limit or 5xx after the retry budget.
    #[error("verification backend unavailable: {0}")]
    Unavailable(String),
    #[error("token not found at verification backend")]
    TokenNotFound,
    #[error("verification backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid verification backend response: {0}")]
    InvalidResponse(String),
    #[error("verification backend misconfigured: {0}")]
    Config(String),
}

/// A freshly minted token bound to a response hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundToken {
    pub token: String,
    pub verification_url: String,
}

/// The two operations this library needs from the issuing service.
///
/// Implementations must be safe to share across tasks; the enforcer holds
/// them behind an `Arc`.
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    // Backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Registered artifact digest for `model_id`.
    //
    // Returns:
    // - `Ok(Some(digest))` when the model has a registered bundle
    // - `Ok(None)` when the model (or its digest) is unknown
    async fn registered_digest(&self, model_id: &str) -> BackendResult<Option<String>>;

    // Mint and sign a new token embedding `response_hash`, derived from `token`.
    async fn bind_response(&self, token: &str, response_hash: &str) -> BackendResult<BoundToken>;
}
