pub mod client;
pub mod http;
pub mod retry;

pub use client::{BackendError, BackendResult, BoundToken, VerificationBackend};
pub use http::HttpBackend;
pub use retry::RetryPolicy;
