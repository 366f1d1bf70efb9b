//! Credential pair and expiry checks
//!
//! A `CredentialPair` holds both tokens and their absolute expiry timestamps
//! (unix milliseconds, computed at storage time from the endpoint's relative
//! `expires_in` deltas). Expiry checks are pure functions of the stored
//! timestamps and a caller-supplied clock reading, so the boundary behavior
//! is testable without sleeping.

use serde::{Deserialize, Serialize};

/// Access + refresh token with absolute expiry timestamps.
///
/// Always stored, replaced, and cleared as one unit. A refresh never patches
/// individual fields; it writes a whole new pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Current access token (Bearer token for API calls)
    pub access_token: String,
    /// Refresh token for obtaining the next pair
    pub refresh_token: String,
    /// Access token expiry as unix timestamp in milliseconds
    pub access_expires_at: u64,
    /// Refresh token expiry as unix timestamp in milliseconds
    pub refresh_expires_at: u64,
}

impl CredentialPair {
    /// Whether the access token is expired at `now_millis`.
    ///
    /// A zero (missing) expiry counts as not expired: that lets anonymous
    /// calls proceed without a token. Callers that require authentication
    /// must check token presence separately.
    pub fn access_expired(&self, now_millis: u64) -> bool {
        self.access_expires_at > 0 && now_millis >= self.access_expires_at
    }

    /// Whether the refresh token is expired at `now_millis`.
    pub fn refresh_expired(&self, now_millis: u64) -> bool {
        self.refresh_expires_at > 0 && now_millis >= self.refresh_expires_at
    }

    /// Whether the pair can still be used to obtain a new access token:
    /// a refresh token is present and not expired.
    pub fn refresh_usable(&self, now_millis: u64) -> bool {
        !self.refresh_token.is_empty() && !self.refresh_expired(now_millis)
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
