//! The in-memory mirror of the persisted session.

use super::store::SessionStore;
use crate::Result;
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Credentials for the single logical backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Opaque user record returned at login, persisted alongside the tokens.
    pub user: Option<serde_json::Value>,
}

impl AuthSession {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            user: None,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_user(mut self, user: serde_json::Value) -> Self {
        self.user = Some(user);
        self
    }
}

/// Body of a successful `POST /api/auth/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Single source of truth for credentials.
///
/// Reads are lock-free; a refresh swaps the whole session at once so no
/// reader ever sees a new access token paired with an old refresh token.
pub struct SessionManager {
    current: ArcSwapOption<AuthSession>,
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            store,
        }
    }

    /// Load the persisted session into memory, if there is one.
    pub async fn restore(&self) -> Result<Option<Arc<AuthSession>>> {
        let loaded = self.store.load().await?.map(Arc::new);
        self.current.store(loaded.clone());
        Ok(loaded)
    }

    /// Persist and install a session (login).
    pub async fn install(&self, session: AuthSession) -> Result<Arc<AuthSession>> {
        self.store.save(&session).await?;
        let session = Arc::new(session);
        self.current.store(Some(session.clone()));
        Ok(session)
    }

    /// Install a refreshed token pair, keeping the user record.
    ///
    /// The in-memory swap always happens; a persistence failure is logged and
    /// the refreshed session stays usable for this process.
    pub async fn replace_tokens(&self, pair: TokenPair) -> Arc<AuthSession> {
        let user = self.current.load().as_ref().and_then(|s| s.user.clone());
        let session = Arc::new(AuthSession {
            access_token: pair.access_token,
            refresh_token: Some(pair.refresh_token),
            user,
        });
        self.current.store(Some(session.clone()));
        if let Err(e) = self.store.save(&session).await {
            warn!(store = self.store.name(), error = %e, "failed to persist refreshed session");
        }
        session
    }

    /// Drop the session from memory and from the store.
    pub async fn clear(&self) {
        self.current.store(None);
        if let Err(e) = self.store.clear().await {
            warn!(store = self.store.name(), error = %e, "failed to clear persisted session");
        }
    }

    pub fn current(&self) -> Option<Arc<AuthSession>> {
        self.current.load_full()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.load().as_ref().map(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current
            .load()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.load().is_some()
    }
}
