//! Single-flight token refresh coordination
//!
//! Any number of interleaved requests can discover an expired access token
//! at the same time; exactly one refresh call may reach the identity
//! provider for the whole burst. The coordinator owns an in-flight marker
//! and a waiter queue behind one mutex. The marker is checked and set in a
//! single critical section with no suspension point in between, so under
//! the cooperative execution model no two leaders can exist.
//!
//! The leader performs the refresh, writes the full new credential pair to
//! the token store before anyone is woken, then drains the waiter queue in
//! arrival order in one pass. On failure every waiter receives a clone of
//! the same error, the store is cleared, and a single `SessionExpired`
//! event is emitted for the whole chain.

use std::sync::Arc;

use gallery_auth::{TokenStore, now_millis, token};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::events::{AuthEvent, AuthEvents};

/// Outcome fanned out to every waiter: the new access token or the shared
/// failure.
type RefreshOutcome = Result<String>;

/// In-flight marker plus the ordered waiter queue. Mutated only under the
/// coordinator's mutex.
#[derive(Default)]
struct FlightState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Process-wide refresh coordinator.
///
/// Constructed once at startup and shared via `Arc`; there is no ambient
/// module state to reset between tests — each test builds its own.
pub struct RefreshCoordinator {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    store: Arc<TokenStore>,
    events: AuthEvents,
    flight: Mutex<FlightState>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        token_url: String,
        client_id: String,
        store: Arc<TokenStore>,
        events: AuthEvents,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id,
            store,
            events,
            flight: Mutex::new(FlightState::default()),
        }
    }

    /// Obtain a fresh access token, joining an in-flight refresh if one
    /// exists.
    ///
    /// The first caller becomes the leader and performs the endpoint call;
    /// everyone arriving while it runs is queued and resumes with the
    /// leader's outcome. The in-flight marker is cleared unconditionally
    /// when the refresh settles, success or failure, so the next expiry can
    /// start a new cycle.
    pub async fn acquire_or_join(&self) -> Result<String> {
        let rx = {
            let mut flight = self.flight.lock().await;
            if flight.in_flight {
                let (tx, rx) = oneshot::channel();
                flight.waiters.push(tx);
                Some(rx)
            } else {
                flight.in_flight = true;
                None
            }
        };

        if let Some(rx) = rx {
            debug!("refresh already in flight, joining waiter queue");
            return match rx.await {
                Ok(outcome) => outcome,
                // The leader drains the queue before releasing the marker,
                // so a dropped sender can't happen in normal operation
                Err(_) => Err(Error::RefreshFailed("refresh settled without result".into())),
            };
        }

        let outcome = self.run_refresh().await;

        let waiters = {
            let mut flight = self.flight.lock().await;
            flight.in_flight = false;
            std::mem::take(&mut flight.waiters)
        };
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "resolving queued waiters");
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }

        outcome
    }

    /// Leader path: one endpoint call, then store update or teardown.
    async fn run_refresh(&self) -> RefreshOutcome {
        let now = now_millis();
        let refresh_token = match self.store.pair().await {
            Some(pair) if pair.refresh_usable(now) => pair.refresh_token,
            _ => {
                // Nothing usable to refresh with: no endpoint call at all
                warn!("refresh requested without a usable refresh token");
                clear_and_notify(&self.store, &self.events).await;
                return Err(Error::AuthenticationRequired);
            }
        };

        match token::refresh(&self.http, &self.token_url, &self.client_id, &refresh_token).await {
            Ok(response) => {
                let pair = response.into_pair(now_millis());
                let access_token = pair.access_token.clone();
                self.store
                    .replace(pair)
                    .await
                    .map_err(|e| Error::Storage(e.to_string()))?;
                info!("token refresh succeeded");
                Ok(access_token)
            }
            Err(e) => {
                // The cause stays in the log; callers see the typed
                // authentication-required condition and render a re-login
                // prompt, not a generic failure
                warn!(error = %e, "token refresh failed, clearing credentials");
                clear_and_notify(&self.store, &self.events).await;
                Err(Error::AuthenticationRequired)
            }
        }
    }
}

/// Clear the token store and emit `SessionExpired` only if there was state
/// to clear. The gate keeps concurrent failures from the same chain from
/// emitting the event more than once.
pub(crate) async fn clear_and_notify(store: &TokenStore, events: &AuthEvents) {
    match store.clear().await {
        Ok(true) => events.emit(AuthEvent::SessionExpired),
        Ok(false) => {}
        Err(e) => {
            warn!(error = %e, "failed to clear token store");
            events.emit(AuthEvent::SessionExpired);
        }
    }
}
