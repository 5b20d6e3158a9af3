use crate::auth::{
    AuthObserver, KeyringSessionStore, MemorySessionStore, NoopAuthObserver, SessionManager,
    SessionStore, TokenRefreshCoordinator, TokenRefresher,
};
use crate::cache::{CacheConfig, ResultCache};
use crate::client::core::{ApiClient, ClientInner};
use crate::client::token_refresher::TransportTokenRefresher;
use crate::config::ResilienceConfig;
use crate::dedup::InFlightDeduplicator;
use crate::interceptors::{Interceptor, InterceptorPipeline};
use crate::resilience::{BackoffConfig, BackoffPolicy, RateLimiter, RateLimiterConfig};
use crate::transport::{HttpTransport, Transport};
use crate::utils::clock::{Clock, SystemClock};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Builder for [`ApiClient`].
///
/// Starts from [`ResilienceConfig::default`] with `API_*` environment
/// overrides applied; every collaborator can be replaced, which is how tests
/// inject a scripted transport and a manual clock.
pub struct ApiClientBuilder {
    config: ResilienceConfig,
    transport: Option<Arc<dyn Transport>>,
    session_store: Option<Arc<dyn SessionStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    observer: Arc<dyn AuthObserver>,
    clock: Arc<dyn Clock>,
    interceptors: InterceptorPipeline,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self::from_config(ResilienceConfig::default().with_env_overrides())
    }

    /// Start from an already loaded configuration (no env overrides applied).
    pub fn from_config(config: ResilienceConfig) -> Self {
        Self {
            config,
            transport: None,
            session_store: None,
            refresher: None,
            observer: Arc::new(NoopAuthObserver),
            clock: Arc::new(SystemClock),
            interceptors: InterceptorPipeline::new(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.http.base_url = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.http.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn rate_limits(mut self, cfg: RateLimiterConfig) -> Self {
        self.config.rate_limits = cfg;
        self
    }

    pub fn cache(mut self, cfg: CacheConfig) -> Self {
        self.config.cache = cfg;
        self
    }

    pub fn backoff(mut self, cfg: BackoffConfig) -> Self {
        self.config.backoff = cfg;
        self
    }

    /// GET prefixes that require a bearer token.
    pub fn gated_get_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.auth.gated_get_prefixes.push(prefix.into());
        self
    }

    /// Replace the network layer (default: [`HttpTransport`]).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace session storage (default: in-memory).
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Persist the session in the OS keyring under the configured service name.
    pub fn keyring_store(mut self) -> Self {
        self.session_store = Some(Arc::new(KeyringSessionStore::new(
            self.config.auth.keyring_service.clone(),
        )));
        self
    }

    /// Replace how refresh tokens are exchanged (default: `POST` to the refresh path).
    pub fn token_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn auth_observer(mut self, observer: Arc<dyn AuthObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    /// Build the client.
    ///
    /// A periodic cache sweeper is started when `cache.sweep_interval_ms` is
    /// set and a tokio runtime is running.
    pub fn build(self) -> Result<ApiClient> {
        self.config.validate()?;
        let config = self.config;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&config.http)?),
        };
        let limiter = Arc::new(RateLimiter::with_clock(
            config.rate_limits.clone(),
            self.clock.clone(),
        ));
        let cache = Arc::new(ResultCache::in_memory(config.cache.clone(), self.clock.clone()));
        if let Some(ms) = config.cache.sweep_interval_ms.filter(|ms| *ms > 0) {
            if tokio::runtime::Handle::try_current().is_ok() {
                cache.spawn_sweeper(Duration::from_millis(ms));
            } else {
                warn!("cache sweeper not started: no tokio runtime");
            }
        }

        let store = self
            .session_store
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()) as Arc<dyn SessionStore>);
        let session = Arc::new(SessionManager::new(store));
        let refresher: Arc<dyn TokenRefresher> = match self.refresher {
            Some(r) => r,
            None => Arc::new(TransportTokenRefresher::new(
                transport.clone(),
                limiter.clone(),
                config.auth.refresh_path.clone(),
            )),
        };
        let refresh = TokenRefreshCoordinator::new(session.clone(), refresher, self.observer);

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                backoff: BackoffPolicy::new(config.backoff.clone()),
                config,
                transport,
                limiter,
                cache,
                dedup: InFlightDeduplicator::new(),
                session,
                refresh,
                interceptors: self.interceptors,
            }),
        })
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
