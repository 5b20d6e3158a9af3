//! Layer configuration: YAML file, then environment, then builder calls.

use crate::cache::CacheConfig;
use crate::resilience::{BackoffConfig, RateLimiterConfig};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout_secs: u64,
    pub proxy_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 30,
            pool_max_idle_per_host: 32,
            pool_idle_timeout_secs: 90,
            proxy_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub refresh_path: String,
    /// GET endpoints that still need a bearer token.
    pub gated_get_prefixes: Vec<String>,
    /// Service name for the OS keyring store.
    pub keyring_service: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_path: "/api/auth/refresh".to_string(),
            gated_get_prefixes: vec!["/api/media/proxy".to_string()],
            keyring_service: "api-resilience".to_string(),
        }
    }
}

/// Where to look in an error body for the backend's code and retry hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorCodeConfig {
    pub code_paths: Vec<String>,
    /// Millisecond retry hints, consulted when no `Retry-After` header is sent.
    pub retry_after_paths: Vec<String>,
}

impl Default for ErrorCodeConfig {
    fn default() -> Self {
        Self {
            code_paths: vec!["code".into(), "error.code".into(), "errorCode".into()],
            retry_after_paths: vec![
                "retryAfterMs".into(),
                "retry_after_ms".into(),
                "error.retryAfterMs".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    #[serde(flatten)]
    pub http: HttpConfig,
    pub rate_limits: RateLimiterConfig,
    pub cache: CacheConfig,
    pub backoff: BackoffConfig,
    pub auth: AuthConfig,
    pub error_codes: ErrorCodeConfig,
}

impl ResilienceConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a YAML file and apply environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        let cfg = Self::from_yaml_str(&raw)?.with_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `API_*` environment variables over the current values.
    ///
    /// - `API_BASE_URL`
    /// - `API_HTTP_TIMEOUT_SECS`
    /// - `API_HTTP_POOL_MAX_IDLE_PER_HOST`
    /// - `API_HTTP_POOL_IDLE_TIMEOUT_SECS`
    /// - `API_PROXY_URL`
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = var("API_BASE_URL").filter(|s| !s.trim().is_empty()) {
            self.http.base_url = url;
        }
        if let Some(secs) = var("API_HTTP_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            self.http.timeout_secs = secs;
        }
        if let Some(n) =
            var("API_HTTP_POOL_MAX_IDLE_PER_HOST").and_then(|s| s.parse::<usize>().ok())
        {
            self.http.pool_max_idle_per_host = n;
        }
        if let Some(secs) =
            var("API_HTTP_POOL_IDLE_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok())
        {
            self.http.pool_idle_timeout_secs = secs;
        }
        if let Some(proxy) = var("API_PROXY_URL").filter(|s| !s.trim().is_empty()) {
            self.http.proxy_url = Some(proxy);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.rate_limits.validate()?;
        if url::Url::parse(&self.http.base_url).is_err() {
            return Err(Error::configuration_with_context(
                "base_url is not an absolute URL",
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(self.http.base_url.clone()),
            ));
        }
        if self.cache.enabled && self.cache.ttl_ms == 0 {
            return Err(Error::configuration_with_context(
                "cache ttl_ms must be positive when the cache is enabled",
                ErrorContext::new().with_field_path("cache.ttl_ms"),
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter_ratio) {
            return Err(Error::configuration_with_context(
                "jitter_ratio must be within 0.0..=1.0",
                ErrorContext::new().with_field_path("backoff.jitter_ratio"),
            ));
        }
        Ok(())
    }
}
