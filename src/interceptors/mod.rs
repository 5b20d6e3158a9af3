//! Interceptor hooks around every network attempt.
//!
//! Useful for logging, metrics and auditing. Interceptors observe; they cannot
//! alter the request or the outcome. Cache hits and coalesced waiters never
//! reach the network and therefore never reach interceptors.

use async_trait::async_trait;

use crate::client::request::{ApiRequest, Method};
use crate::transport::RawResponse;
use crate::Error;

/// Per-attempt context passed to interceptors.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Canonical request path.
    pub path: String,
    pub endpoint_class: String,
    /// 1 for the first attempt, 2 for a replay after token refresh.
    pub attempt: u32,
    pub authenticated: bool,
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn on_request(&self, _ctx: &RequestContext, _req: &ApiRequest) {}

    /// Called for every response, including non-2xx statuses.
    async fn on_response(&self, _ctx: &RequestContext, _req: &ApiRequest, _resp: &RawResponse) {}

    /// Called when no response was obtained.
    async fn on_error(&self, _ctx: &RequestContext, _req: &ApiRequest, _err: &Error) {}
}

/// Runs hooks in registration order.
pub struct InterceptorPipeline {
    pub(crate) interceptors: Vec<Box<dyn Interceptor>>,
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    pub fn with<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    pub fn push(&mut self, interceptor: Box<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run hooks around a provided async function that performs the actual call.
    pub async fn execute<F, Fut>(
        &self,
        ctx: &RequestContext,
        req: &ApiRequest,
        f: F,
    ) -> Result<RawResponse, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<RawResponse, Error>>,
    {
        for ic in &self.interceptors {
            ic.on_request(ctx, req).await;
        }

        match f().await {
            Ok(resp) => {
                for ic in &self.interceptors {
                    ic.on_response(ctx, req, &resp).await;
                }
                Ok(resp)
            }
            Err(err) => {
                for ic in &self.interceptors {
                    ic.on_error(ctx, req, &err).await;
                }
                Err(err)
            }
        }
    }
}

impl Default for InterceptorPipeline {
    fn default() -> Self {
        Self::new()
    }
}
