/*
 * Responsibility
 * - Crate-wide Error aggregating the per-module error types
 * - Lets callers that don't care which step failed use a single `?`
 */
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::backend::BackendError;
use crate::services::binding::BindError;
use crate::services::policy::EnforceError;
use crate::services::token::TokenError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Enforce(#[from] EnforceError),
    #[error(transparent)]
    Bind(#[from] BindError),
}
