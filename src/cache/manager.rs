//! Result cache: short-TTL memoization of completed reads.

use super::backend::{CacheBackend, MemoryCache, PutOutcome};
use super::key::RequestKey;
use crate::utils::clock::Clock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_ms: u64,
    pub max_entries: usize,
    /// Run a background sweep at this interval when set.
    pub sweep_interval_ms: Option<u64>,
    /// GET paths whose results are cached without a per-request opt-in.
    pub cacheable_prefixes: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: 30_000,
            max_entries: 1_000,
            sweep_interval_ms: None,
            cacheable_prefixes: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }
    pub fn with_cacheable_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cacheable_prefixes.push(prefix.into());
        self
    }
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

/// TTL cache of completed read responses, keyed like the deduplicator.
///
/// Answers "did we compute this recently"; the deduplicator answers "is this
/// being computed right now". Expiry is checked on read, so an expired value
/// is never returned even if no sweep has run.
pub struct ResultCache<V> {
    config: CacheConfig,
    backend: Box<dyn CacheBackend<V>>,
    stats: AtomicStats,
}

impl<V: Clone + Send + Sync + 'static> ResultCache<V> {
    pub fn new(config: CacheConfig, backend: Box<dyn CacheBackend<V>>) -> Self {
        Self {
            config,
            backend,
            stats: AtomicStats::default(),
        }
    }

    /// In-memory cache sized and timed by `config`.
    pub fn in_memory(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let backend = MemoryCache::with_clock(config.max_entries, clock);
        Self::new(config, Box::new(backend))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether results for `path` are cached without an explicit opt-in.
    pub fn covers(&self, path: &str) -> bool {
        self.config.enabled
            && self
                .config
                .cacheable_prefixes
                .iter()
                .any(|p| path.starts_with(p.as_str()))
    }

    pub fn get(&self, key: &RequestKey) -> Option<V> {
        if !self.config.enabled {
            return None;
        }
        match self.backend.get(key) {
            Some(v) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "result cache hit");
                Some(v)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: &RequestKey, value: V) {
        if !self.config.enabled {
            return;
        }
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        if self.backend.put(key, value, self.config.ttl()) == PutOutcome::Evicted {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn invalidate(&self, key: &RequestKey) -> bool {
        let removed = self.backend.remove(key);
        if removed {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Drop every cached entry whose canonical path starts with `path_prefix`.
    pub fn invalidate_prefix(&self, path_prefix: &str) -> usize {
        let prefix = path_prefix.trim_end_matches('/').to_string();
        let removed = self.backend.remove_where(&|canonical: &str| {
            let path = canonical.split_once(':').map(|(_, p)| p).unwrap_or(canonical);
            path.strip_prefix(prefix.as_str())
                .map(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
                .unwrap_or(false)
        });
        if removed > 0 {
            self.stats
                .invalidations
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(prefix = path_prefix, removed, "result cache invalidated");
        }
        removed
    }

    pub fn sweep(&self) -> usize {
        let removed = self.backend.sweep();
        if removed > 0 {
            debug!(removed, "result cache sweep");
        }
        removed
    }

    pub fn clear(&self) {
        self.backend.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            puts: self.stats.puts.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            invalidations: self.stats.invalidations.load(Ordering::Relaxed),
            entries: self.backend.len(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Periodically sweep expired entries so keys that are never re-read
    /// don't accumulate. The task ends when the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(cache) => {
                        cache.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}
