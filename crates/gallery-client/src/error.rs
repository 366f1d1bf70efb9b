//! Error types for the client coordination layer
//!
//! `Error` is `Clone` so a single refresh failure can fan out to every
//! waiter queued behind the in-flight refresh. String payloads keep that
//! free. `AuthenticationRequired` is the typed unrecoverable condition
//! callers render distinctly from ordinary network or API failures.

/// Errors from request interception, refresh coordination, and session
/// operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Credentials are unrecoverable; the user must log in again.
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The refresh settled without delivering a result to this waiter.
    /// Endpoint rejections surface as [`Error::AuthenticationRequired`]
    /// instead.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<gallery_auth::Error> for Error {
    fn from(err: gallery_auth::Error) -> Self {
        match err {
            gallery_auth::Error::Http(msg) => Error::Http(msg),
            gallery_auth::Error::InvalidCredentials(msg) => Error::InvalidCredentials(msg),
            gallery_auth::Error::TokenEndpoint(msg) => Error::Http(msg),
            gallery_auth::Error::Storage(msg) | gallery_auth::Error::Parse(msg) => {
                Error::Storage(msg)
            }
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
