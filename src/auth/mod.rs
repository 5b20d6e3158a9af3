//! Session credentials and their lifecycle.
//!
//! - [`SessionManager`]: in-memory mirror of the persisted [`AuthSession`]
//! - [`SessionStore`]: durable storage ([`MemorySessionStore`], [`KeyringSessionStore`])
//! - [`TokenRefreshCoordinator`]: single-flight refresh with FIFO waiters
//! - [`AuthObserver`]: lifecycle notifications for the UI layer

pub mod observer;
pub mod refresh;
pub mod session;
pub mod store;

pub use observer::{AuthEvent, AuthObserver, BroadcastAuthObserver, NoopAuthObserver};
pub use refresh::{RefreshPhase, TokenRefreshCoordinator, TokenRefresher};
pub use session::{AuthSession, SessionManager, TokenPair};
pub use store::{KeyringSessionStore, MemorySessionStore, SessionStore};
