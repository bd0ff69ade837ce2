//! HTTP(S) client for the issuing service.
//!
//! Digest lookups are idempotent and go through the retry policy. Bind calls
//! mint a new token, so they are sent exactly once.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::services::backend::client::{
    BackendError, BackendResult, BoundToken, VerificationBackend,
};
use crate::services::backend::retry::RetryPolicy;

const SLOW_REQUEST: Duration = Duration::from_secs(1);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct DigestResponse {
    #[serde(default)]
    model_digest: Option<String>,
}

#[derive(Debug, Serialize)]
struct BindRequest<'a> {
    response_hash: &'a str,
}

#[derive(Debug, Deserialize)]
struct BindResponse {
    token: String,
    verification_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// reqwest-backed [`VerificationBackend`].
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the API key
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(BackendError::Config(format!(
                "base url cannot carry a path: {}",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .user_agent(format!("model-signature-rs/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            retry: config.retry_policy(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Config("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn decorate(&self, req: RequestBuilder, request_id: &str) -> RequestBuilder {
        let req = req.header("X-Request-ID", request_id);
        match &self.api_key {
            Some(key) => req.header("X-API-Key", key),
            None => req,
        }
    }

    /// Send until a non-retryable outcome or the retry budget is spent.
    ///
    /// Returns the response for 2xx and 404; everything else is mapped to a
    /// [`BackendError`].
    async fn send<F>(
        &self,
        op: &'static str,
        retry: RetryPolicy,
        build: F,
    ) -> BackendResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let request_id = Uuid::new_v4().to_string();
            let started = Instant::now();
            let result = self.decorate(build(), &request_id).send().await;
            let elapsed = started.elapsed();

            let (failure, delay) = match result {
                Ok(resp) => {
                    let status = resp.status();
                    debug!(
                        request_id = %request_id,
                        op,
                        status = status.as_u16(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "verification backend responded"
                    );
                    if elapsed > SLOW_REQUEST {
                        warn!(
                            request_id = %request_id,
                            op,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "slow verification backend request"
                        );
                    }

                    if status.is_success() || status == StatusCode::NOT_FOUND {
                        return Ok(resp);
                    }
                    if !is_retryable(status) {
                        return Err(rejected(resp).await);
                    }

                    let delay = retry_after(&resp).unwrap_or_else(|| retry.backoff(attempt));
                    (format!("http status {}", status), delay)
                }
                Err(e) => {
                    // The url may carry a bearer token in its path
                    let e = e.without_url();
                    debug!(
                        request_id = %request_id,
                        op,
                        error = %e,
                        timeout = e.is_timeout(),
                        "verification backend request failed"
                    );
                    (e.to_string(), retry.backoff(attempt))
                }
            };

            if !retry.has_attempts_left(attempt) {
                warn!(
                    op,
                    attempts = attempt + 1,
                    error = %failure,
                    "verification backend unavailable"
                );
                return Err(BackendError::Unavailable(failure));
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

async fn rejected(resp: Response) -> BackendError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorDetail>(&body) {
        Ok(ErrorDetail {
            detail: Some(serde_json::Value::String(s)),
        }) => s,
        Ok(ErrorDetail {
            detail: Some(other),
        }) => other.to_string(),
        _ => body,
    };
    BackendError::Rejected { status, message }
}

async fn json_body<T: serde::de::DeserializeOwned>(resp: Response) -> BackendResult<T> {
    resp.json::<T>()
        .await
        .map_err(|e| BackendError::InvalidResponse(e.without_url().to_string()))
}

#[async_trait]
impl VerificationBackend for HttpBackend {
    fn backend_name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self))]
    async fn registered_digest(&self, model_id: &str) -> BackendResult<Option<String>> {
        let url = self.endpoint(&["api", "v1", "models", model_id, "digest"])?;

        let resp = self
            .send("registered_digest", self.retry, || self.client.get(url.clone()))
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!("model not registered");
            return Ok(None);
        }

        let body: DigestResponse = json_body(resp).await?;
        Ok(body.model_digest.filter(|d| !d.trim().is_empty()))
    }

    #[instrument(skip(self, token))]
    async fn bind_response(&self, token: &str, response_hash: &str) -> BackendResult<BoundToken> {
        let url = self.endpoint(&["api", "v1", "jwt", token, "bind-response"])?;
        let body = BindRequest { response_hash };

        let resp = self
            .send("bind_response", RetryPolicy::none(), || {
                self.client.post(url.clone()).json(&body)
            })
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::TokenNotFound);
        }

        let bound: BindResponse = json_body(resp).await?;
        Ok(BoundToken {
            token: bound.token,
            verification_url: bound.verification_url,
        })
    }
}
