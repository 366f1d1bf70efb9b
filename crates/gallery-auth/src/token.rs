//! Identity provider token endpoint
//!
//! Two interactions with the OpenID-Connect token endpoint:
//! 1. Login (`grant_type=password`) with the user's credentials
//! 2. Refresh (`grant_type=refresh_token`) with the stored refresh token
//!
//! Both POST a form-encoded body and parse the same JSON response. The
//! endpoint reports expiry as relative seconds; `TokenResponse::into_pair`
//! converts to absolute unix-millisecond timestamps at receipt time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pair::CredentialPair;

/// Response from the token endpoint for both login and refresh.
///
/// `expires_in` / `refresh_expires_in` are deltas in seconds from the
/// response time, not absolute timestamps.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
    /// Seconds until the refresh token expires
    pub refresh_expires_in: u64,
}

impl TokenResponse {
    /// Convert relative expiries into an absolute credential pair,
    /// anchored at `now_millis`.
    pub fn into_pair(self, now_millis: u64) -> CredentialPair {
        CredentialPair {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            access_expires_at: now_millis + self.expires_in * 1000,
            refresh_expires_at: now_millis + self.refresh_expires_in * 1000,
        }
    }
}

/// Log in with the password grant.
///
/// The scope is fixed to `openid` so the provider issues an ID-bearing
/// token set.
pub async fn login(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    username: &str,
    password: &str,
) -> Result<TokenResponse> {
    debug!(username, "requesting tokens with password grant");
    let response = client
        .post(token_url)
        .form(&[
            ("client_id", client_id),
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
            ("scope", "openid"),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    parse_token_response(response, "login").await
}

/// Obtain a new credential pair with the refresh token grant.
pub async fn refresh(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    refresh_token: &str,
) -> Result<TokenResponse> {
    debug!("requesting tokens with refresh_token grant");
    let response = client
        .post(token_url)
        .form(&[
            ("client_id", client_id),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", "openid"),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("refresh request failed: {e}")))?;

    parse_token_response(response, "refresh").await
}

async fn parse_token_response(response: reqwest::Response, op: &str) -> Result<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 400/401/403 mean the credentials or refresh token were rejected
        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "{op} rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenEndpoint(format!(
            "{op} returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenEndpoint(format!("invalid {op} response: {e}")))
}
