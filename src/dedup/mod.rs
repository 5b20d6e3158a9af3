//! In-flight request coalescing (single-flight).
//!
//! Concurrent callers asking for the same [`RequestKey`] share one underlying
//! call. The pending entry is removed by the call itself at the moment it
//! settles, before any caller observes the outcome, so a request issued right
//! after settlement always starts a fresh call instead of replaying a stale one.
//!
//! The call runs on its own tokio task, so it settles (and frees its key) even
//! when every caller stops awaiting it.
//!
//! Only safe for reads: the pipeline never routes mutating or multipart
//! requests through here.

use crate::cache::RequestKey;
use crate::{Error, ErrorContext, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type SharedCall<T> = Shared<BoxFuture<'static, Result<T>>>;

/// A call shared by every caller that asked for the same key while it ran.
struct PendingCall<T: Clone> {
    id: u64,
    future: SharedCall<T>,
    attached: usize,
}

pub struct InFlightDeduplicator<T: Clone> {
    pending: Arc<Mutex<HashMap<String, PendingCall<T>>>>,
    next_id: AtomicU64,
}

impl<T> InFlightDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `factory`'s call for `key`, or attach to the one already running.
    ///
    /// `factory` is invoked only when no call is pending for `key`, and only to
    /// construct the future; it must not block or touch this deduplicator.
    /// Every attached caller receives the same value or the same error.
    pub async fn run<F, Fut>(&self, key: &RequestKey, factory: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let call = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.get_mut(&key.hash) {
                Some(existing) => {
                    existing.attached += 1;
                    debug!(key = %key, attached = existing.attached, "joined in-flight call");
                    existing.future.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let call = Self::settling(Arc::clone(&self.pending), key.hash.clone(), id, factory());
                    pending.insert(
                        key.hash.clone(),
                        PendingCall {
                            id,
                            future: call.clone(),
                            attached: 1,
                        },
                    );
                    call
                }
            }
        };
        call.await
    }

    /// Spawn `fut` so it removes its own map entry the moment it settles.
    ///
    /// Must be called from within a tokio runtime.
    fn settling<Fut>(
        pending: Arc<Mutex<HashMap<String, PendingCall<T>>>>,
        hash: String,
        id: u64,
        fut: Fut,
    ) -> SharedCall<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let task = {
            let pending = Arc::clone(&pending);
            let hash = hash.clone();
            tokio::spawn(async move {
                let outcome = fut.await;
                release(&pending, &hash, id);
                outcome
            })
        };
        async move {
            task.await.unwrap_or_else(|e| {
                release(&pending, &hash, id);
                Err(Error::runtime_with_context(
                    "in-flight call task failed",
                    ErrorContext::new()
                        .with_source("dedup")
                        .with_details(e.to_string()),
                ))
            })
        }
        .boxed()
        .shared()
    }

    /// Number of keys with a call currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_pending(&self, key: &RequestKey) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key.hash)
    }
}

/// Drop the entry for `hash`, unless a newer call has already replaced it.
fn release<T: Clone>(pending: &Mutex<HashMap<String, PendingCall<T>>>, hash: &str, id: u64) {
    let mut map = pending.lock().unwrap_or_else(PoisonError::into_inner);
    if map.get(hash).map(|c| c.id == id).unwrap_or(false) {
        map.remove(hash);
    }
}

impl<T> Default for InFlightDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::request::Method;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn key(path: &str) -> RequestKey {
        RequestKey::build(Method::Get, path, &[])
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let dedup: Arc<InFlightDeduplicator<Arc<String>>> = Arc::new(InFlightDeduplicator::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let dedup = dedup.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                let k = key("/employees");
                let outcome = dedup
                    .run(&k, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Arc::new("payload".to_string()))
                    })
                    .await;
                outcome
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_error_is_shared_and_entry_removed() {
        let dedup: InFlightDeduplicator<u32> = InFlightDeduplicator::new();
        let k = key("/fails");

        let first = dedup.run(&k, || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(Error::network("connection reset"))
        });
        let second = dedup.run(&k, || async { Ok(7) });
        let (a, b) = tokio::join!(first, second);

        assert!(matches!(a, Err(Error::Network { .. })));
        assert!(matches!(b, Err(Error::Network { .. })));
        assert!(!dedup.is_pending(&k));

        // Immediately after settlement a new call runs
        let fresh = dedup.run(&k, || async { Ok(7) }).await.unwrap();
        assert_eq!(fresh, 7);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_coalesce() {
        let dedup: InFlightDeduplicator<&'static str> = InFlightDeduplicator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();
        let (ka, kb) = (key("/a"), key("/b"));
        let (a, b) = tokio::join!(
            dedup.run(&ka, move || async move {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok("a")
            }),
            dedup.run(&kb, move || async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok("b")
            }),
        );
        assert_eq!((a.unwrap(), b.unwrap()), ("a", "b"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_call_still_settles() {
        let dedup: InFlightDeduplicator<u32> = InFlightDeduplicator::new();
        let k = key("/slow");
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            dedup.run(&k, move || async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                c.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(dedup.is_pending(&k));

        // Nobody awaits the call any more, yet it completes and frees the key
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dedup.is_pending(&k));

        let value = dedup.run(&k, || async { Ok(2) }).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_call_frees_its_key() {
        let dedup: InFlightDeduplicator<u32> = InFlightDeduplicator::new();
        let k = key("/panics");

        let outcome = dedup
            .run(&k, || async {
                if true {
                    panic!("handler blew up");
                }
                Ok(0)
            })
            .await;
        assert!(matches!(outcome, Err(Error::Runtime { .. })));
        assert!(!dedup.is_pending(&k));
    }
}
