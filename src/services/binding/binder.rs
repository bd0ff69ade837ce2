//! Response binding: tie a token to one exact model output.
//!
//! The hash is computed here; minting and signing the bound token is the
//! backend's job. A bind call is sent once and never retried, since a second
//! attempt would mint a second bound token.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::services::backend::{BackendError, VerificationBackend};
use crate::services::token::{self, Claims, TokenError};

/// Prefix shared with `model_digest` claims.
pub const HASH_PREFIX: &str = "sha256:";

/// `sha256:<lowercase hex>` of the UTF-8 bytes of `response_text`.
///
/// Anyone holding the response text can recompute this with any SHA-256
/// implementation.
pub fn hash_output(response_text: &str) -> String {
    let digest = Sha256::digest(response_text.as_bytes());
    format!("{}{}", HASH_PREFIX, hex::encode(digest))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub bound_token: String,
    pub response_hash: String,
    pub verification_url: String,
    // Claims of `bound_token`.
    pub claims: Claims,
}

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("response text must not be empty")]
    EmptyResponse,
    #[error("original token is unknown or expired at the verification backend")]
    TokenNotFound,
    #[error("verification backend unavailable")]
    BackendUnavailable(#[source] BackendError),
    // Backend answered, but not with a bound token (auth, bad payload, config).
    #[error("bind request failed: {0}")]
    BackendFailed(#[source] BackendError),
    #[error("bound token rejected: {0}")]
    InvalidBoundToken(String),
}

impl From<BackendError> for BindError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::TokenNotFound => Self::TokenNotFound,
            e @ BackendError::Unavailable(_) => Self::BackendUnavailable(e),
            other => Self::BackendFailed(other),
        }
    }
}

#[derive(Clone)]
pub struct ResponseBinder {
    backend: Arc<dyn VerificationBackend>,
}

impl std::fmt::Debug for ResponseBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBinder")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl ResponseBinder {
    pub fn new(backend: Arc<dyn VerificationBackend>) -> Self {
        Self { backend }
    }

    /// Bind `original_token` to `response_text`.
    ///
    /// Binding the same token twice is allowed: each call yields a new token
    /// (new `token_id`) carrying the same `response_hash`.
    pub async fn bind(
        &self,
        original_token: &str,
        response_text: &str,
    ) -> Result<Binding, BindError> {
        let original_token = original_token.trim();
        if !token::is_valid_format(original_token) {
            return Err(
                TokenError::Malformed("expected three base64url segments".to_string()).into(),
            );
        }
        if response_text.is_empty() {
            return Err(BindError::EmptyResponse);
        }

        let response_hash = hash_output(response_text);

        let minted = self
            .backend
            .bind_response(original_token, &response_hash)
            .await
            .map_err(|e| {
                warn!(error = %e, backend = self.backend.backend_name(), "response bind failed");
                BindError::from(e)
            })?;

        let claims = token::parse(&minted.token)
            .map_err(|e| BindError::InvalidBoundToken(e.to_string()))?;

        if claims.response_hash() != Some(response_hash.as_str()) {
            return Err(BindError::InvalidBoundToken(format!(
                "response_hash is {:?}, expected {}",
                claims.response_hash(),
                response_hash
            )));
        }

        // Original may be opaque to us; only compare when it parses.
        if let Ok(original) = token::parse(original_token) {
            if original.token_id() == claims.token_id() {
                return Err(BindError::InvalidBoundToken(
                    "bound token reuses the original token_id".to_string(),
                ));
            }
        }

        info!(
            token_id = %claims.token_id(),
            response_hash = %response_hash,
            "response bound"
        );

        Ok(Binding {
            bound_token: minted.token,
            response_hash,
            verification_url: minted.verification_url,
            claims,
        })
    }
}
