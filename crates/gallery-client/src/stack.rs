//! Wiring for the full auth stack
//!
//! One constructor that builds the token store, event channel, refresh
//! coordinator, API client, and session controller in dependency order and
//! starts the state-sync task. Application startup and the integration
//! tests both go through this.

use std::sync::Arc;

use gallery_auth::{Storage, TokenStore};

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::AuthEvents;
use crate::refresh::RefreshCoordinator;
use crate::session::SessionController;

/// The assembled auth stack.
pub struct AuthStack {
    pub store: Arc<TokenStore>,
    pub events: AuthEvents,
    pub refresher: Arc<RefreshCoordinator>,
    pub api: Arc<ApiClient>,
    pub session: SessionController,
    state_sync: tokio::task::JoinHandle<()>,
}

impl AuthStack {
    /// Build every component over the given storage backend.
    pub async fn build(config: &ClientConfig, storage: Arc<dyn Storage>) -> Result<Self> {
        let store = Arc::new(
            TokenStore::load(storage)
                .await
                .map_err(|e| Error::Storage(e.to_string()))?,
        );
        let events = AuthEvents::new();
        let http = ApiClient::build_http(config)?;

        let refresher = Arc::new(RefreshCoordinator::new(
            http.clone(),
            config.token_url.clone(),
            config.client_id.clone(),
            store.clone(),
            events.clone(),
        ));
        let api = Arc::new(ApiClient::new(
            config,
            http.clone(),
            store.clone(),
            refresher.clone(),
            events.clone(),
        ));
        let session = SessionController::new(config, http, api.clone(), store.clone()).await;
        let state_sync = session.spawn_state_sync();

        Ok(Self {
            store,
            events,
            refresher,
            api,
            session,
            state_sync,
        })
    }
}

impl Drop for AuthStack {
    fn drop(&mut self) {
        self.state_sync.abort();
    }
}
