//! Authentication lifecycle notifications.
//!
//! The UI (or whatever owns navigation) subscribes to learn about refreshed
//! tokens and about the session ending. `on_authentication_failed` fires once
//! per transition into the logged-out state, never once per failed request.

use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    TokenRefreshed { access_token: String },
    AuthenticationFailed,
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::TokenRefreshed { .. } => "token-refreshed",
            AuthEvent::AuthenticationFailed => "authentication-failed",
        }
    }
}

/// Receives auth lifecycle events. Called from the refresh task, so
/// implementations must return quickly.
pub trait AuthObserver: Send + Sync {
    fn on_token_refreshed(&self, _access_token: &str) {}
    fn on_authentication_failed(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuthObserver;

impl AuthObserver for NoopAuthObserver {}

/// Fans events out over a tokio broadcast channel.
///
/// Events sent while nobody is subscribed are dropped.
pub struct BroadcastAuthObserver {
    tx: broadcast::Sender<AuthEvent>,
}

impl BroadcastAuthObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: AuthEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            debug!(event = name, "auth event dropped, no subscribers");
        }
    }
}

impl Default for BroadcastAuthObserver {
    fn default() -> Self {
        Self::new(16)
    }
}

impl AuthObserver for BroadcastAuthObserver {
    fn on_token_refreshed(&self, access_token: &str) {
        self.emit(AuthEvent::TokenRefreshed {
            access_token: access_token.to_string(),
        });
    }

    fn on_authentication_failed(&self) {
        self.emit(AuthEvent::AuthenticationFailed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_in_order() {
        let observer = BroadcastAuthObserver::default();
        let mut rx = observer.subscribe();
        observer.on_token_refreshed("t2");
        observer.on_authentication_failed();

        assert_eq!(
            rx.recv().await.unwrap(),
            AuthEvent::TokenRefreshed {
                access_token: "t2".into()
            }
        );
        assert_eq!(rx.recv().await.unwrap(), AuthEvent::AuthenticationFailed);
    }

    #[test]
    fn test_no_subscribers_is_fine() {
        let observer = BroadcastAuthObserver::new(0);
        observer.on_authentication_failed();
    }
}
