//! # Request Identity and Result Caching
//!
//! Canonical request keys shared by the deduplicator and the result cache, and
//! a short-TTL cache for completed reads.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RequestKey`] | Canonical `METHOD:path?sortedParams` identity plus SHA-256 |
//! | [`RequestDescriptor`] | Normalized method/path/params, also used to build the wire target |
//! | [`ResultCache`] | TTL cache with statistics and optional background sweep |
//! | [`CacheBackend`] | Trait for storage backends |
//! | [`MemoryCache`] | LRU-bounded in-memory backend |
//! | [`NullCache`] | No-op backend for disabling caching |
//!
//! ## Example
//!
//! ```rust
//! use api_resilience::cache::{CacheConfig, RequestKey, ResultCache};
//! use api_resilience::client::Method;
//! use api_resilience::utils::SystemClock;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache: ResultCache<String> = ResultCache::in_memory(
//!     CacheConfig::new().with_ttl(Duration::from_secs(30)),
//!     Arc::new(SystemClock),
//! );
//! let key = RequestKey::build(Method::Get, "/api/employees", &[("page".into(), "1".into())]);
//! cache.put(&key, "cached body".to_string());
//! assert_eq!(cache.get(&key).as_deref(), Some("cached body"));
//! ```

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache, PutOutcome};
pub use key::{canonical_path, split_query, RequestDescriptor, RequestKey};
pub use manager::{CacheConfig, CacheStats, ResultCache};
