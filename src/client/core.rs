use crate::auth::{AuthSession, SessionManager, TokenRefreshCoordinator};
use crate::cache::{RequestKey, ResultCache};
use crate::client::request::{ApiRequest, ApiResponse, MultipartPart};
use crate::config::ResilienceConfig;
use crate::dedup::InFlightDeduplicator;
use crate::interceptors::InterceptorPipeline;
use crate::resilience::{BackoffPolicy, RateLimiter};
use crate::transport::Transport;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Shared state behind every clone of an [`ApiClient`].
pub(crate) struct ClientInner {
    pub(crate) config: ResilienceConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) cache: Arc<ResultCache<ApiResponse>>,
    pub(crate) dedup: InFlightDeduplicator<ApiResponse>,
    pub(crate) session: Arc<SessionManager>,
    pub(crate) refresh: TokenRefreshCoordinator,
    pub(crate) interceptors: InterceptorPipeline,
}

/// Resilient client for one backend.
///
/// Cheap to clone; clones share the limiter, cache, in-flight calls and
/// session.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn builder() -> crate::client::builder::ApiClientBuilder {
        crate::client::builder::ApiClientBuilder::new()
    }

    /// Client with default configuration plus `API_*` environment overrides.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.inner.config
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Multipart POST. Never coalesced or cached.
    pub async fn upload(&self, path: &str, parts: Vec<MultipartPart>) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path).multipart(parts)).await
    }

    /// Load a persisted session, if any. Returns whether one was found.
    pub async fn restore_session(&self) -> Result<bool> {
        let restored = self.inner.session.restore().await?;
        if restored.is_some() {
            self.inner.refresh.reset();
        }
        info!(restored = restored.is_some(), "session restore");
        Ok(restored.is_some())
    }

    /// Install a session obtained from the login endpoint.
    pub async fn login(&self, session: AuthSession) -> Result<()> {
        self.inner.session.install(session).await?;
        self.inner.cache.clear();
        self.inner.refresh.reset();
        info!("session installed");
        Ok(())
    }

    pub async fn logout(&self) {
        self.inner.session.clear().await;
        self.inner.cache.clear();
        self.inner.refresh.reset();
        info!("session cleared");
    }

    pub fn session(&self) -> Option<Arc<AuthSession>> {
        self.inner.session.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }

    pub fn refresh_coordinator(&self) -> &TokenRefreshCoordinator {
        &self.inner.refresh
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn cache(&self) -> &ResultCache<ApiResponse> {
        &self.inner.cache
    }

    /// Drop cached results for `request`'s key.
    pub fn invalidate(&self, request: &ApiRequest) -> bool {
        self.inner.cache.invalidate(&request.descriptor().key())
    }

    pub fn request_key(&self, request: &ApiRequest) -> RequestKey {
        request.descriptor().key()
    }

    /// Snapshot current runtime signals (facts only) for application-layer decisions.
    pub fn signals(&self) -> crate::client::signals::SignalsSnapshot {
        crate::client::signals::SignalsSnapshot {
            rate_limits: self.inner.limiter.snapshots(),
            cache: self.inner.cache.stats(),
            in_flight: self.inner.dedup.in_flight(),
            refresh_phase: self.inner.refresh.phase(),
            authenticated: self.inner.session.is_authenticated(),
        }
    }
}
