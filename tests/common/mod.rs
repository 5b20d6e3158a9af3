//! Shared fixtures: a scripted in-process transport and client builders.

#![allow(dead_code)]

use api_resilience::client::{ApiClientBuilder, ApiRequest, Method, Payload};
use api_resilience::transport::{RawResponse, Transport};
use api_resilience::utils::ManualClock;
use api_resilience::{ResilienceConfig, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    /// Canonical path plus sorted query, as it would go on the wire.
    pub target: String,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

type Handler = dyn Fn(&ApiRequest, Option<&str>) -> Result<RawResponse> + Send + Sync;

/// Transport answering from a closure after an optional delay.
pub struct MockTransport {
    handler: Box<Handler>,
    delay: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest, Option<&str>) -> Result<RawResponse> + Send + Sync + 'static,
    {
        Self::with_delay(Duration::ZERO, handler)
    }

    pub fn with_delay<F>(delay: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest, Option<&str>) -> Result<RawResponse> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every call answers 200 with `body`.
    pub fn always(body: Value) -> Arc<Self> {
        Self::new(move |_, _| Ok(ok(body.clone())))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse> {
        let descriptor = request.descriptor();
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method,
            target: descriptor.target(),
            path: descriptor.path.clone(),
            bearer: bearer.map(String::from),
            body: match &request.payload {
                Payload::Json(v) => Some(v.clone()),
                _ => None,
            },
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(request, bearer)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Counts calls through a closure-shared counter.
pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn bump(c: &AtomicUsize) -> usize {
    c.fetch_add(1, Ordering::SeqCst) + 1
}

pub fn ok(body: Value) -> RawResponse {
    RawResponse::new(200, body)
}

pub fn status(code: u16, body: Value) -> RawResponse {
    RawResponse::new(code, body)
}

pub fn token_expired() -> RawResponse {
    status(401, json!({"code": "TOKEN_EXPIRED", "message": "jwt expired"}))
}

/// Deterministic configuration: no env overrides, no jitter.
pub fn test_config() -> ResilienceConfig {
    let mut cfg = ResilienceConfig::default();
    cfg.http.base_url = "http://backend.test".to_string();
    cfg.backoff.jitter = false;
    cfg
}

pub fn builder(transport: Arc<MockTransport>, clock: &ManualClock) -> ApiClientBuilder {
    ApiClientBuilder::from_config(test_config())
        .transport(transport)
        .clock(Arc::new(clock.clone()))
}
