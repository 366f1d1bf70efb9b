//! Session state machine
//!
//! Two states, `Anonymous` and `Authenticated`, derived from the token
//! store — never the other way around. Explicit transitions come from
//! login/register/logout; forced transitions arrive through the store
//! itself (a failed refresh chain clears it, another browsing context may
//! rewrite it), which is why the controller re-derives state from every
//! store snapshot instead of trusting its own last write.

use std::sync::Arc;

use common::Secret;
use gallery_auth::{CredentialPair, TokenStore, now_millis, token};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api;
use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::Result;

/// Process-wide authentication state consumed by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

/// Derive the session state from a store snapshot.
///
/// Authenticated iff a usable access token or a usable refresh token
/// exists: an expired access token alone does not end the session while
/// the refresh token can still mint a replacement.
pub fn derive_state(pair: Option<&CredentialPair>, now_millis: u64) -> SessionState {
    match pair {
        Some(pair)
            if (!pair.access_token.is_empty() && !pair.access_expired(now_millis))
                || pair.refresh_usable(now_millis) =>
        {
            SessionState::Authenticated
        }
        _ => SessionState::Anonymous,
    }
}

/// Authentication state machine and login/register/logout operations.
pub struct SessionController {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    api: Arc<ApiClient>,
    store: Arc<TokenStore>,
    state_tx: Arc<watch::Sender<SessionState>>,
}

impl SessionController {
    /// Build the controller, computing the initial state from the store.
    pub async fn new(
        config: &ClientConfig,
        http: reqwest::Client,
        api: Arc<ApiClient>,
        store: Arc<TokenStore>,
    ) -> Self {
        let initial = derive_state(store.pair().await.as_ref(), now_millis());
        info!(state = ?initial, "session controller initialized");
        let (state_tx, _) = watch::channel(initial);
        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            api,
            store,
            state_tx: Arc::new(state_tx),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Spawn a task that re-derives state from every store mutation: a
    /// refresh writing a new pair, a failed chain clearing it, or another
    /// browsing context changing it. No network calls are involved.
    pub fn spawn_state_sync(&self) -> tokio::task::JoinHandle<()> {
        let mut store_rx = self.store.subscribe();
        let state_tx = Arc::clone(&self.state_tx);
        tokio::spawn(async move {
            while store_rx.changed().await.is_ok() {
                let snapshot = store_rx.borrow_and_update().clone();
                let state = derive_state(snapshot.as_ref(), now_millis());
                // send_if_modified avoids waking subscribers on no-op writes
                state_tx.send_if_modified(|current| {
                    if *current != state {
                        debug!(?state, "session state re-derived from store");
                        *current = state;
                        true
                    } else {
                        false
                    }
                });
            }
        })
    }

    /// Log in with the password grant. On success the new credential pair
    /// is stored as one unit and the state becomes `Authenticated`; on
    /// failure nothing is stored and the error surfaces to the caller.
    pub async fn login(&self, username: &str, password: &Secret<String>) -> Result<()> {
        match token::login(
            &self.http,
            &self.token_url,
            &self.client_id,
            username,
            password.expose(),
        )
        .await
        {
            Ok(response) => {
                let pair = response.into_pair(now_millis());
                self.store.replace(pair).await.map_err(|e| {
                    crate::error::Error::Storage(e.to_string())
                })?;
                self.state_tx.send_replace(SessionState::Authenticated);
                info!(username, "login succeeded");
                Ok(())
            }
            Err(e) => {
                warn!(username, error = %e, "login failed");
                Err(e.into())
            }
        }
    }

    /// Two-step registration: create the identity, create the profile,
    /// then chain into `login`.
    ///
    /// If the profile step fails after the identity step succeeded, the
    /// provider is left with an orphaned identity; the error propagates
    /// and no compensation is attempted (see DESIGN.md).
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &Secret<String>,
    ) -> Result<api::ProfileCreated> {
        let identity = api::register_identity(&self.api, username, email, password.expose()).await?;
        debug!(username, identity_id = %identity.id, "identity created");
        let profile = api::register_profile(&self.api, &identity.id, username).await?;
        self.login(username, password).await?;
        Ok(profile)
    }

    /// Log out: clear the store unconditionally and become `Anonymous`.
    pub async fn logout(&self) -> Result<()> {
        self.store
            .clear()
            .await
            .map_err(|e| crate::error::Error::Storage(e.to_string()))?;
        self.state_tx.send_replace(SessionState::Anonymous);
        info!("logged out");
        Ok(())
    }

    /// React to a storage-change notification from another browsing
    /// context: reload the store from its backend and re-derive state.
    pub async fn handle_storage_change(&self) -> Result<()> {
        self.store
            .reload()
            .await
            .map_err(|e| crate::error::Error::Storage(e.to_string()))?;
        let state = derive_state(self.store.pair().await.as_ref(), now_millis());
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
        Ok(())
    }
}
