//! Request interceptor pipeline
//!
//! `ApiClient` wraps every outgoing backend call with the pre-flight and
//! post-flight token handling:
//!
//! Pre-flight: read the stored pair; no pair means the call goes out
//! unauthenticated. An expired access token with a usable refresh token
//! joins the coordinated refresh and waits for the new token. An expired
//! access token with no usable refresh token never reaches the network —
//! the store is cleared and the call fails as `AuthenticationRequired`.
//!
//! Post-flight: a 401 triggers at most one refresh-and-resend cycle per
//! original request. A 401 on the resent request propagates as an ordinary
//! API error; the store was already torn down by whichever refresh failed.

use std::sync::Arc;
use std::time::Duration;

use gallery_auth::{TokenStore, now_millis};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::AuthEvents;
use crate::refresh::{RefreshCoordinator, clear_and_notify};

/// Bearer-authenticated client for the gallery backend.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<TokenStore>,
    refresher: Arc<RefreshCoordinator>,
    events: AuthEvents,
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        http: reqwest::Client,
        store: Arc<TokenStore>,
        refresher: Arc<RefreshCoordinator>,
        events: AuthEvents,
    ) -> Self {
        Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            store,
            refresher,
            events,
        }
    }

    /// Build the shared reqwest client with the configured timeout.
    pub fn build_http(config: &ClientConfig) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))
    }

    /// GET a JSON resource.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self.execute(Method::GET, path, query, None).await?;
        expect_json(response).await
    }

    /// POST a JSON body and parse a JSON response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let body = serde_json::to_value(body)
            .map_err(|e| Error::Http(format!("serializing request body: {e}")))?;
        let response = self.execute(Method::POST, path, &[], Some(body)).await?;
        expect_json(response).await
    }

    /// POST with query parameters and no body, parsing a JSON response.
    /// Covers the backend's toggle endpoints (like, subscribe).
    pub async fn post_query_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self.execute(Method::POST, path, query, None).await?;
        expect_json(response).await
    }

    /// DELETE a resource, discarding any response body.
    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let response = self.execute(Method::DELETE, path, query, None).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Run one request through the full pipeline and return the raw
    /// response (which may be any status except an unretried 401).
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let token = self.preflight_token().await?;
        let response = self
            .dispatch(method.clone(), path, query, body.as_ref(), token.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // Exactly one resend per original request; a 401 on the resent
        // request falls through to the caller
        debug!(path, "401 received, attempting refresh-and-resend");
        let new_token = self.postflight_refresh().await?;
        self.dispatch(method, path, query, body.as_ref(), Some(&new_token))
            .await
    }

    /// Pre-flight: produce the bearer token to attach, refreshing first if
    /// the stored access token is expired. `None` means send the request
    /// unauthenticated.
    async fn preflight_token(&self) -> Result<Option<String>> {
        let pair = match self.store.pair().await {
            Some(pair) => pair,
            None => return Ok(None),
        };

        // A pair with an empty access token (possible when the backend only
        // holds partial entries) counts as no token: never attach an empty
        // bearer header
        if pair.access_token.is_empty() {
            return Ok(None);
        }

        let now = now_millis();
        if !pair.access_expired(now) {
            return Ok(Some(pair.access_token));
        }

        if pair.refresh_usable(now) {
            let token = self.refresher.acquire_or_join().await?;
            return Ok(Some(token));
        }

        warn!("access and refresh tokens both unusable, failing before send");
        clear_and_notify(&self.store, &self.events).await;
        Err(Error::AuthenticationRequired)
    }

    /// Post-flight: a 401 arrived; obtain a fresh token or give up.
    async fn postflight_refresh(&self) -> Result<String> {
        let now = now_millis();
        match self.store.pair().await {
            Some(pair) if pair.refresh_usable(now) => self.refresher.acquire_or_join().await,
            _ => {
                clear_and_notify(&self.store, &self.events).await;
                Err(Error::AuthenticationRequired)
            }
        }
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .map_err(|e| Error::Http(format!("request to {url} failed: {e}")))
    }
}

/// Map a response to deserialized JSON, or to `Api` for any non-2xx status.
async fn expect_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| Error::Http(format!("invalid JSON response: {e}")))
}
