//! Token refresh over the same transport as every other call.

use crate::auth::{TokenPair, TokenRefresher};
use crate::client::request::ApiRequest;
use crate::resilience::RateLimiter;
use crate::transport::Transport;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// `POST {refresh_path}` with `{"refreshToken": ..}`, expecting
/// `{"accessToken": .., "refreshToken": ..}`.
///
/// The call is not admitted through the rate limiter (a refresh must never be
/// starved by the traffic waiting on it) but it is recorded against its class.
pub struct TransportTokenRefresher {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    refresh_path: String,
}

impl TransportTokenRefresher {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        refresh_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            limiter,
            refresh_path: refresh_path.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for TransportTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let request =
            ApiRequest::post(&self.refresh_path).body(json!({ "refreshToken": refresh_token }));
        let class = self.limiter.class_for(&request.descriptor().path).to_string();
        self.limiter.record(&class);

        let resp = self.transport.execute(&request, None).await?;
        debug!(endpoint_class = class.as_str(), http_status = resp.status, "refresh endpoint answered");
        if !resp.is_success() {
            return Err(Error::authentication_failed(format!(
                "refresh rejected with HTTP {}",
                resp.status
            )));
        }
        serde_json::from_value(resp.body).map_err(|e| {
            Error::authentication_failed(format!("malformed refresh response: {}", e))
        })
    }
}
