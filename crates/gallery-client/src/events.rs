//! Auth event channel
//!
//! Replaces the forced window-level navigation the original design performed
//! from inside the interceptor: the token layer publishes events, and the
//! presentation layer decides what navigating to the login route looks like.

use tokio::sync::broadcast;
use tracing::debug;

/// Events the presentation layer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// Credentials became unrecoverable; the subscriber should route the
    /// user to the unauthenticated entry point. Emitted at most once per
    /// failed refresh chain.
    SessionExpired,
}

/// Cloneable handle to the process-wide auth event channel.
#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        debug!(?event, "auth event emitted");
        // A send error only means no subscriber is currently listening
        let _ = self.tx.send(event);
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let events = AuthEvents::new();
        let mut rx = events.subscribe();
        events.emit(AuthEvent::SessionExpired);
        assert_eq!(rx.recv().await.unwrap(), AuthEvent::SessionExpired);
    }

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic() {
        let events = AuthEvents::new();
        events.emit(AuthEvent::SessionExpired);
    }
}
