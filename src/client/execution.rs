//! The request pipeline.
//!
//! ```text
//! send ─▶ key ─▶ [read] cache ─▶ dedup ─┐
//!          │                            ▼
//!          └──────[write]──────▶ limiter ─▶ transport ─▶ classify ─▶ recover
//! ```

use super::core::{ApiClient, ClientInner};
use super::error_classification::Failure;
use super::preflight::resource_root;
use crate::client::request::{ApiRequest, ApiResponse};
use crate::error_code::RecoveryPolicy;
use crate::interceptors::RequestContext;
use crate::transport::RawResponse;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

impl ApiClient {
    /// Submit a request through the full pipeline.
    ///
    /// Reads are answered from the cache when fresh, otherwise coalesced with
    /// any identical read already on the wire. Only the call that actually
    /// goes to the network spends rate-limit budget.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        if !request.is_idempotent_read() {
            return self.inner.dispatch(&request).await;
        }

        let descriptor = request.descriptor();
        let key = descriptor.key();
        let cacheable = request.cache || self.inner.cache.covers(&descriptor.path);
        if cacheable {
            if let Some(hit) = self.inner.cache.get(&key) {
                return Ok(ApiResponse {
                    from_cache: true,
                    ..hit
                });
            }
        }

        let inner = Arc::clone(&self.inner);
        let cache_key = key.clone();
        self.inner
            .dedup
            .run(&key, move || async move {
                let resp = inner.dispatch(&request).await?;
                if cacheable {
                    inner.cache.put(&cache_key, resp.clone());
                }
                Ok(resp)
            })
            .await
    }
}

impl ClientInner {
    /// One logical call: admission, the network attempt, and recovery.
    pub(crate) async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let path = request.descriptor().path;
        let class = self.admit(&path)?;

        let bearer = self.bearer_for(request, &path);
        let resp = self
            .attempt(request, &path, &class, bearer.as_deref(), 1)
            .await?;
        if resp.is_success() {
            return Ok(self.complete(request, &path, &class, resp));
        }

        let failure = Failure::from_response(&resp, &self.config.error_codes);
        if failure.kind.policy() != RecoveryPolicy::RefreshAndReplay {
            return Err(self.recover(failure, &class).await);
        }

        info!(endpoint_class = class.as_str(), path = path.as_str(), "access token expired, refreshing");
        let token = self.refresh.refresh().await?;
        let replay = self.attempt(request, &path, &class, Some(&token), 2).await?;
        if replay.is_success() {
            return Ok(self.complete(request, &path, &class, replay));
        }

        // A replay is never refreshed again
        let failure = Failure::from_response(&replay, &self.config.error_codes);
        if failure.kind.policy() == RecoveryPolicy::RefreshAndReplay {
            return Err(failure.into_error());
        }
        Err(self.recover(failure, &class).await)
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        path: &str,
        class: &str,
        bearer: Option<&str>,
        attempt: u32,
    ) -> Result<RawResponse> {
        let ctx = RequestContext {
            method: request.method,
            path: path.to_string(),
            endpoint_class: class.to_string(),
            attempt,
            authenticated: bearer.is_some(),
        };
        let start = Instant::now();
        let outcome = self
            .interceptors
            .execute(&ctx, request, || self.transport.execute(request, bearer))
            .await;

        match &outcome {
            Ok(resp) => debug!(
                endpoint_class = class,
                http_status = resp.status,
                attempt,
                duration_ms = start.elapsed().as_millis() as u64,
                "{} {}",
                request.method,
                path
            ),
            Err(e) => warn!(
                endpoint_class = class,
                error_kind = e.kind().map(|k| k.name()).unwrap_or("internal"),
                attempt,
                duration_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "{} {} failed",
                request.method,
                path
            ),
        }
        outcome
    }

    fn complete(&self, request: &ApiRequest, path: &str, class: &str, resp: RawResponse) -> ApiResponse {
        self.limiter.on_success(class);
        if request.method.is_mutating() {
            let root = resource_root(path);
            self.cache.invalidate_prefix(&root);
        }
        ApiResponse::new(resp.status, resp.body)
    }

    /// Apply the recovery policy of a failure that will not be replayed.
    async fn recover(&self, failure: Failure, class: &str) -> Error {
        match failure.kind.policy() {
            RecoveryPolicy::TerminateSession => {
                warn!(
                    endpoint_class = class,
                    http_status = failure.status,
                    error_kind = failure.kind.name(),
                    "non-recoverable authentication failure"
                );
                self.refresh.terminate(failure.kind).await;
                failure.into_error()
            }
            RecoveryPolicy::Backoff => {
                let attempt = self.limiter.throttle_count(class);
                let delay = self.backoff.delay_for(attempt, failure.retry_hint);
                self.limiter.defer(class, delay);
                let retry_after_ms = delay.as_millis() as u64;
                warn!(
                    endpoint_class = class,
                    http_status = failure.status,
                    retry_after_ms,
                    consecutive = attempt + 1,
                    "server rate limited, backing off"
                );
                Error::ServerRateLimited {
                    status: failure.status,
                    retry_after_ms,
                    message: failure.message,
                }
            }
            RecoveryPolicy::RefreshAndReplay | RecoveryPolicy::Surface => {
                debug!(
                    endpoint_class = class,
                    http_status = failure.status,
                    error_kind = failure.kind.name(),
                    "request failed"
                );
                failure.into_error()
            }
        }
    }
}
