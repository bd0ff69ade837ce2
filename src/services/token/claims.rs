use serde::Deserialize;

use crate::services::token::parser::TokenError;

/// Maximum lifetime (exp - iat) the issuing service hands out, seconds.
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 15 * 60;

/// Verification token payload as it appears on the wire.
///
/// Every field is optional here on purpose: presence checks happen once, in
/// `TryFrom<RawClaims> for Claims`, so nothing downstream deals with
/// half-populated claims.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawClaims {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default, alias = "user_fingerprint")]
    pub user_fp: Option<String>,

    #[serde(default)]
    pub deployment_id: Option<String>,
    #[serde(default)]
    pub model_digest: Option<String>,
    #[serde(default)]
    pub response_hash: Option<String>,

    #[serde(default, alias = "issued_at")]
    pub iat: Option<i64>,
    #[serde(default, alias = "expires_at")]
    pub exp: Option<i64>,
    #[serde(default, alias = "token_id")]
    pub jti: Option<String>,
}

/// Decoded and validated claims of a verification token.
///
/// Immutable once built: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    model_id: String,
    provider_id: String,
    user_fingerprint: String,
    deployment_id: Option<String>,
    model_digest: Option<String>,
    response_hash: Option<String>,
    issued_at: i64,
    expires_at: i64,
    token_id: String,
}

impl Claims {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Opaque session identifier supplied by the caller at issuance.
    pub fn user_fingerprint(&self) -> &str {
        &self.user_fingerprint
    }

    /// Present only for mTLS-bound deployments.
    pub fn deployment_id(&self) -> Option<&str> {
        self.deployment_id.as_deref()
    }

    /// Content hash of the model artifacts (`sha256:<hex>`).
    pub fn model_digest(&self) -> Option<&str> {
        self.model_digest.as_deref()
    }

    pub fn response_hash(&self) -> Option<&str> {
        self.response_hash.as_deref()
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    /// True for tokens minted by a response-bind call.
    pub fn is_bound(&self) -> bool {
        self.response_hash.is_some()
    }

    /// `expires_at - issued_at`, exact for any pair of `i64` timestamps.
    pub fn lifetime(&self) -> u64 {
        // expires_at > issued_at holds after TryFrom
        self.expires_at.abs_diff(self.issued_at)
    }
}

// Blank strings count as absent, same as a missing key.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String, TokenError> {
    non_blank(value).ok_or(TokenError::MissingClaim(name))
}

impl TryFrom<RawClaims> for Claims {
    type Error = TokenError;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        let model_id = required(raw.model_id, "model_id")?;
        let provider_id = required(raw.provider_id, "provider_id")?;
        let user_fingerprint = required(raw.user_fp, "user_fingerprint")?;
        let issued_at = raw.iat.ok_or(TokenError::MissingClaim("issued_at"))?;
        let expires_at = raw.exp.ok_or(TokenError::MissingClaim("expires_at"))?;
        let token_id = required(raw.jti, "token_id")?;

        if expires_at <= issued_at {
            return Err(TokenError::Malformed(format!(
                "expires_at ({expires_at}) must be after issued_at ({issued_at})"
            )));
        }

        Ok(Self {
            model_id,
            provider_id,
            user_fingerprint,
            deployment_id: non_blank(raw.deployment_id),
            model_digest: non_blank(raw.model_digest),
            response_hash: non_blank(raw.response_hash),
            issued_at,
            expires_at,
            token_id,
        })
    }
}
