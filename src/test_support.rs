//! Fixture tokens and an in-memory backend for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{Value, json};

use crate::services::backend::{BackendError, BackendResult, BoundToken, VerificationBackend};

pub const TEST_DIGEST: &str =
    "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

/// A fully populated payload issued at `now` with a 10 minute lifetime.
pub fn standard_payload(now: i64) -> Value {
    json!({
        "model_id": "model_gpt4",
        "provider_id": "prov_openai",
        "user_fp": "session-123",
        "deployment_id": "dep_1",
        "model_digest": TEST_DIGEST,
        "iat": now,
        "exp": now + 600,
        "jti": "tok_original",
    })
}

/// Sign `payload` with a throwaway HS256 key; the library never checks it.
pub fn mint(payload: &Value) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        payload,
        &EncodingKey::from_secret(b"test-only-secret"),
    )
    .expect("fixture token encodes")
}

/// A token with a valid header and signature segment around arbitrary payload bytes.
pub fn encode_payload(payload: &[u8]) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload);
    format!("{header}.{body}.c2lnbmF0dXJl")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Up,
    Down,
    // Reachable, but refuses every call with 401.
    Rejecting,
}

/// In-memory stand-in for the issuing service.
pub struct FakeBackend {
    digests: Mutex<HashMap<String, String>>,
    availability: Mutex<Availability>,
    digest_calls: AtomicUsize,
    minted: AtomicUsize,
    known_tokens: Mutex<Vec<String>>,
    tamper_hash: Mutex<Option<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            digests: Mutex::new(HashMap::new()),
            availability: Mutex::new(Availability::Up),
            digest_calls: AtomicUsize::new(0),
            minted: AtomicUsize::new(0),
            known_tokens: Mutex::new(Vec::new()),
            tamper_hash: Mutex::new(None),
        }
    }

    pub fn with_digest(self, model_id: &str, digest: &str) -> Self {
        self.digests
            .lock()
            .unwrap()
            .insert(model_id.to_string(), digest.to_string());
        self
    }

    pub fn with_known_token(self, token: &str) -> Self {
        self.known_tokens.lock().unwrap().push(token.to_string());
        self
    }

    pub fn set_availability(&self, availability: Availability) {
        *self.availability.lock().unwrap() = availability;
    }

    /// Make the next minted tokens carry `hash` instead of the requested one.
    pub fn tamper_with_hash(&self, hash: &str) {
        *self.tamper_hash.lock().unwrap() = Some(hash.to_string());
    }

    pub fn digest_calls(&self) -> usize {
        self.digest_calls.load(Ordering::SeqCst)
    }

    fn ensure_up(&self) -> BackendResult<()> {
        match *self.availability.lock().unwrap() {
            Availability::Up => Ok(()),
            Availability::Down => Err(BackendError::Unavailable("connection refused".into())),
            Availability::Rejecting => Err(BackendError::Rejected {
                status: 401,
                message: "invalid api key".into(),
            }),
        }
    }
}

#[async_trait]
impl VerificationBackend for FakeBackend {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn registered_digest(&self, model_id: &str) -> BackendResult<Option<String>> {
        self.digest_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_up()?;
        Ok(self.digests.lock().unwrap().get(model_id).cloned())
    }

    async fn bind_response(&self, token: &str, response_hash: &str) -> BackendResult<BoundToken> {
        self.ensure_up()?;
        if !self.known_tokens.lock().unwrap().iter().any(|t| t == token) {
            return Err(BackendError::TokenNotFound);
        }

        let original = crate::services::token::parser::parse(token)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let n = self.minted.fetch_add(1, Ordering::SeqCst);
        let hash = self
            .tamper_hash
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| response_hash.to_string());

        let bound = mint(&json!({
            "model_id": original.model_id(),
            "provider_id": original.provider_id(),
            "user_fp": original.user_fingerprint(),
            "deployment_id": original.deployment_id(),
            "model_digest": original.model_digest(),
            "response_hash": hash,
            "iat": original.issued_at(),
            "exp": original.expires_at(),
            "jti": format!("tok_bound_{n}"),
        }));

        Ok(BoundToken {
            verification_url: format!("https://verify.example/t/tok_bound_{n}"),
            token: bound,
        })
    }
}
