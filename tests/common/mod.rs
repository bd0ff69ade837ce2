#![allow(dead_code)]

use jsonwebtoken::{EncodingKey, Header};
use serde_json::{Value, json};

pub const DIGEST: &str = "sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn payload(issued_at: i64, lifetime: i64) -> Value {
    json!({
        "model_id": "model_gpt4",
        "provider_id": "prov_openai",
        "user_fp": "session-123",
        "deployment_id": "dep_1",
        "model_digest": DIGEST,
        "iat": issued_at,
        "exp": issued_at + lifetime,
        "jti": format!("tok_{issued_at}"),
    })
}

pub fn mint(payload: &Value) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        payload,
        &EncodingKey::from_secret(b"integration-test-secret"),
    )
    .expect("fixture token encodes")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
