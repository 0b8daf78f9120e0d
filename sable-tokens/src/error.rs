//! Error types for the `sable-tokens` crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token tracker configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] sable_core::SableError),
}

pub type Result<T> = std::result::Result<T, TokenError>;
