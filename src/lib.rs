//! Policy enforcement for model identity verification tokens.
//!
//! A relying party receives a short-lived token asserting "model X, served
//! by provider Y", parses it, and evaluates a [`PolicyConfig`] against its
//! claims to get an allow/deny [`Decision`] with enumerated reasons. A token
//! can also be re-bound to one exact model output via [`ResponseBinder`].
//!
//! ```ignore
//! let backend = Arc::new(HttpBackend::new(&BackendConfig::from_env()?)?);
//! let enforcer = PolicyEnforcer::new(backend.clone());
//!
//! let decision = enforcer.enforce(&PolicyConfig::secure(), &token).await?;
//! if !decision.allowed() {
//!     for reason in decision.reasons() {
//!         tracing::warn!(code = reason.code(), %reason, "token denied");
//!     }
//! }
//!
//! let binding = ResponseBinder::new(backend).bind(&token, &response_text).await?;
//! ```
//!
//! No tracing subscriber is installed here; that is left to the application.

pub mod config;
pub mod error;
pub mod services;

#[cfg(test)]
mod test_support;

pub use config::{BackendConfig, ConfigError};
pub use error::{Error, Result};
pub use services::backend::{
    BackendError, BoundToken, HttpBackend, RetryPolicy, VerificationBackend,
};
pub use services::binding::{BindError, Binding, ResponseBinder, hash_output};
pub use services::policy::{
    BundleFailure, Decision, EnforceError, FailMode, PolicyConfig, PolicyEnforcer, QuickCheck,
    Reason,
};
pub use services::token::{
    Claims, MAX_TOKEN_LIFETIME_SECS, TokenError, age, is_expired, is_token_expired,
    is_valid_format, parse, token_age,
};
