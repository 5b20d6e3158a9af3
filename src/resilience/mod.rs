//! # Resilience Primitives Module
//!
//! Admission control and throttle bookkeeping applied to every outbound call.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Per-endpoint-class fixed-window rate limiter |
//! | [`backoff`] | Delay computation for server throttling (HTTP 429) |
//!
//! ## Rate Limiter
//!
//! Each endpoint class owns a `{max_requests, window_ms}` budget. Attempts over
//! budget are rejected before any network call is made:
//!
//! ```rust
//! use api_resilience::resilience::rate_limiter::{
//!     EndpointClass, RateLimitPolicy, RateLimiter, RateLimiterConfig,
//! };
//!
//! let config = RateLimiterConfig::new(RateLimitPolicy::new(100, 60_000)).with_class(
//!     EndpointClass::new("contacts", "/api/contacts", RateLimitPolicy::new(3, 60_000)),
//! );
//! let limiter = RateLimiter::new(config);
//!
//! let class = limiter.class_for("/api/contacts/7").to_string();
//! let admitted: Vec<bool> = (0..4).map(|_| limiter.admit(&class)).collect();
//! assert_eq!(admitted, vec![true, true, true, false]);
//! ```

pub mod backoff;
pub mod rate_limiter;

pub use backoff::{BackoffConfig, BackoffPolicy};
pub use rate_limiter::{
    EndpointClass, RateLimitPolicy, RateLimiter, RateLimiterConfig, RateLimiterSnapshot,
    DEFAULT_CLASS,
};
