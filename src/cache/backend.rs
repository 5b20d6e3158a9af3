//! Cache backend implementations.

use super::key::RequestKey;
use crate::utils::clock::{self, Clock};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    canonical: String,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

/// Outcome of a `put`, reported back for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Replaced,
    /// Inserted after evicting the least recently used entry.
    Evicted,
}

pub trait CacheBackend<V>: Send + Sync {
    /// Live value for `key`; expired entries are dropped and reported as a miss.
    fn get(&self, key: &RequestKey) -> Option<V>;
    fn put(&self, key: &RequestKey, value: V, ttl: Duration) -> PutOutcome;
    fn remove(&self, key: &RequestKey) -> bool;
    /// Remove every entry whose canonical key matches `pred`.
    fn remove_where(&self, pred: &dyn Fn(&str) -> bool) -> usize;
    /// Drop expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
    fn clear(&self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn name(&self) -> &'static str;
}

/// In-memory LRU-bounded TTL cache.
pub struct MemoryCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V> MemoryCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, clock::system())
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            clock,
        }
    }
}

impl<V: Clone + Send + Sync> CacheBackend<V> for MemoryCache<V> {
    fn get(&self, key: &RequestKey) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = entries.peek(&key.hash)?.is_expired(now);
        if expired {
            entries.pop(&key.hash);
            return None;
        }
        entries.get(&key.hash).map(|e| e.value.clone())
    }

    fn put(&self, key: &RequestKey, value: V, ttl: Duration) -> PutOutcome {
        let entry = CacheEntry {
            value,
            canonical: key.canonical.clone(),
            stored_at: self.clock.now(),
            ttl,
        };
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.push(key.hash.clone(), entry) {
            None => PutOutcome::Inserted,
            Some((old, _)) if old == key.hash => PutOutcome::Replaced,
            Some(_) => PutOutcome::Evicted,
        }
    }

    fn remove(&self, key: &RequestKey) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(&key.hash)
            .is_some()
    }

    fn remove_where(&self, pred: &dyn Fn(&str) -> bool) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(_, e)| pred(&e.canonical))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &doomed {
            entries.pop(k);
        }
        doomed.len()
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            entries.pop(k);
        }
        expired.len()
    }

    fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// No-op backend; every lookup misses.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CacheBackend<V> for NullCache {
    fn get(&self, _: &RequestKey) -> Option<V> {
        None
    }
    fn put(&self, _: &RequestKey, _: V, _: Duration) -> PutOutcome {
        PutOutcome::Inserted
    }
    fn remove(&self, _: &RequestKey) -> bool {
        false
    }
    fn remove_where(&self, _: &dyn Fn(&str) -> bool) -> usize {
        0
    }
    fn sweep(&self) -> usize {
        0
    }
    fn clear(&self) {}
    fn len(&self) -> usize {
        0
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
