//! Durable session storage.

use super::session::AuthSession;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

/// Where the session survives restarts.
///
/// Three string entries are kept: the two tokens and the JSON-encoded user
/// record. A session without an access token is treated as absent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<AuthSession>>;
    async fn save(&self, session: &AuthSession) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    fn name(&self) -> &'static str;
}

fn encode(session: &AuthSession) -> Result<Vec<(&'static str, Option<String>)>> {
    let user = session
        .user
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    Ok(vec![
        (ACCESS_TOKEN_KEY, Some(session.access_token.clone())),
        (REFRESH_TOKEN_KEY, session.refresh_token.clone()),
        (USER_KEY, user),
    ])
}

fn decode(mut read: impl FnMut(&str) -> Result<Option<String>>) -> Result<Option<AuthSession>> {
    let Some(access_token) = read(ACCESS_TOKEN_KEY)? else {
        return Ok(None);
    };
    let refresh_token = read(REFRESH_TOKEN_KEY)?;
    let user = read(USER_KEY)?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?;
    Ok(Some(AuthSession {
        access_token,
        refresh_token,
        user,
    }))
}

/// Process-local store, used in tests and for sessions that should not persist.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<AuthSession>> {
        decode(|key| Ok(self.get(key)))
    }

    async fn save(&self, session: &AuthSession) -> Result<()> {
        let pairs = encode(session)?;
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (key, value) in pairs {
            match value {
                Some(v) => entries.insert(key.to_string(), v),
                None => entries.remove(key),
            };
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// OS keyring store (Keychain, Secret Service, Credential Manager).
pub struct KeyringSessionStore {
    service: String,
}

impl KeyringSessionStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(|e| Error::Storage {
            message: format!("keyring entry {}/{}: {}", self.service, key, e),
        })
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(v) => Ok(Some(v)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Storage {
                message: format!("keyring read {}: {}", key, e),
            }),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Storage {
                message: format!("keyring delete {}: {}", key, e),
            }),
        }
    }
}

#[async_trait]
impl SessionStore for KeyringSessionStore {
    async fn load(&self) -> Result<Option<AuthSession>> {
        decode(|key| self.read(key))
    }

    async fn save(&self, session: &AuthSession) -> Result<()> {
        for (key, value) in encode(session)? {
            match value {
                Some(v) => self
                    .entry(key)?
                    .set_password(&v)
                    .map_err(|e| Error::Storage {
                        message: format!("keyring write {}: {}", key, e),
                    })?,
                None => self.delete(key)?,
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
            self.delete(key)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_access_token_means_no_session() {
        let store = MemorySessionStore::new();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_is_stored_as_json() {
        let store = MemorySessionStore::new();
        store
            .save(&AuthSession::new("a").with_user(json!({"name": "Ana"})))
            .await
            .unwrap();
        assert_eq!(store.get(USER_KEY).as_deref(), Some(r#"{"name":"Ana"}"#));
        assert!(store.get(REFRESH_TOKEN_KEY).is_none());

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.user, Some(json!({"name": "Ana"})));
    }

    #[tokio::test]
    async fn test_corrupt_user_record_is_an_error() {
        let store = MemorySessionStore::new();
        store.save(&AuthSession::new("a")).await.unwrap();
        store
            .entries
            .write()
            .unwrap()
            .insert(USER_KEY.to_string(), "{not json".to_string());
        assert!(matches!(
            store.load().await,
            Err(Error::Serialization(_))
        ));
    }
}
