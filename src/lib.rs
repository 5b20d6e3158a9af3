//! # api-resilience
//!
//! A client-side resilience layer for talking to one JSON-over-HTTP backend
//! from many concurrent callers.
//!
//! ## Overview
//!
//! Every request passes through a fixed pipeline before and after the
//! network:
//!
//! - **Rate limiting**: fixed-window budgets per endpoint class, enforced
//!   before any I/O
//! - **Coalescing**: identical reads already on the wire are shared
//! - **Result caching**: completed reads are memoized for a short TTL
//! - **Token refresh**: an expired access token is refreshed exactly once no
//!   matter how many requests discover it, and those requests are replayed
//! - **Error taxonomy**: every failure maps to one [`ErrorKind`] with a fixed
//!   recovery policy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use api_resilience::{ApiClient, AuthSession};
//!
//! #[tokio::main]
//! async fn main() -> api_resilience::Result<()> {
//!     let client = ApiClient::builder()
//!         .base_url("https://api.example.com")
//!         .build()?;
//!     client
//!         .login(AuthSession::new("access").with_refresh_token("refresh"))
//!         .await?;
//!
//!     let contacts = client.get("/api/contacts?page=1").await?;
//!     println!("{}", contacts.body);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`ApiClient`], its builder and the request pipeline |
//! | [`resilience`] | Per-class rate limiter and 429 backoff |
//! | [`cache`] | Canonical request keys and the TTL result cache |
//! | [`dedup`] | In-flight request coalescing |
//! | [`auth`] | Session storage, refresh coordination, auth events |
//! | [`transport`] | Network seam and the reqwest implementation |
//! | [`interceptors`] | Hooks around every network attempt |
//! | [`config`] | YAML + environment configuration |

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod dedup;
pub mod interceptors;
pub mod resilience;
pub mod transport;
pub mod utils;

pub use auth::{AuthEvent, AuthObserver, AuthSession, BroadcastAuthObserver, RefreshPhase};
pub use cache::RequestKey;
pub use client::{ApiClient, ApiClientBuilder, ApiRequest, ApiResponse, Method, SignalsSnapshot};
pub use config::ResilienceConfig;
pub use error_code::{classify, ErrorKind, RecoveryPolicy};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub mod error_code;
pub use error::{Error, ErrorContext};
