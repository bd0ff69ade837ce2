//! Verification token parsing (no network, no signature check).
//!
//! Signature trust is established by the issuing service. This module only
//! turns the compact `header.payload.signature` form into [`Claims`] and
//! answers time questions about them.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::debug;

use crate::services::token::claims::{Claims, RawClaims};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),
}

/// Cheap structural pre-check: three dot-separated, non-empty base64url
/// segments.
pub fn is_valid_format(raw_token: &str) -> bool {
    let mut segments = 0;
    for part in raw_token.split('.') {
        segments += 1;
        if part.is_empty()
            || !part
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return false;
        }
    }
    segments == 3
}

/// Decode a raw token into validated [`Claims`].
pub fn parse(raw_token: &str) -> Result<Claims, TokenError> {
    let raw_token = raw_token.trim();
    if !is_valid_format(raw_token) {
        return Err(TokenError::Malformed(
            "expected three base64url segments".to_string(),
        ));
    }

    // Header must be a JOSE header with a known alg; its content is not used further.
    jsonwebtoken::decode_header(raw_token).map_err(|e| {
        debug!(error = %e, "token header rejected");
        TokenError::Malformed(format!("invalid header: {e}"))
    })?;

    let payload = raw_token
        .split('.')
        .nth(1)
        .ok_or_else(|| TokenError::Malformed("missing payload segment".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TokenError::Malformed(format!("payload is not base64url: {e}")))?;

    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::Malformed(format!("payload is not json: {e}")))?;
    if !value.is_object() {
        return Err(TokenError::Malformed(
            "payload is not a json object".to_string(),
        ));
    }

    let raw: RawClaims = serde_json::from_value(value)
        .map_err(|e| TokenError::Malformed(format!("invalid claim type: {e}")))?;

    Claims::try_from(raw)
}

pub fn is_expired(claims: &Claims, now: i64) -> bool {
    now >= claims.expires_at()
}

/// Seconds since issuance. A token "from the future" (clock skew) has age 0.
pub fn age(claims: &Claims, now: i64) -> u64 {
    if now <= claims.issued_at() {
        return 0;
    }
    now.abs_diff(claims.issued_at())
}

/// `Some(expired?)` for a parseable token, `None` otherwise.
pub fn is_token_expired(raw_token: &str, now: i64) -> Option<bool> {
    parse(raw_token).ok().map(|c| is_expired(&c, now))
}

/// `Some(age)` for a parseable token, `None` otherwise.
pub fn token_age(raw_token: &str, now: i64) -> Option<u64> {
    parse(raw_token).ok().map(|c| age(&c, now))
}
