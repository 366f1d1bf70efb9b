//! Error types for token layer operations

/// Errors from token storage and identity provider operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token endpoint error: {0}")]
    TokenEndpoint(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Result alias for token layer operations.
pub type Result<T> = std::result::Result<T, Error>;
