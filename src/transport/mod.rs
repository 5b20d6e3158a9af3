//! Network seam of the pipeline.
//!
//! Everything above this trait is transport-agnostic; tests substitute a
//! scripted implementation and production uses [`HttpTransport`].

pub mod http;

pub use http::HttpTransport;

use crate::client::request::ApiRequest;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// A completed exchange, successful or not.
///
/// Only failures to obtain a response at all (DNS, connect, timeout) are
/// reported as `Err`; every HTTP status comes back here.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    /// Parsed JSON body; a non-JSON body is kept as a string, an empty one as null.
    pub body: serde_json::Value,
}

impl RawResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First present header among `names`.
    pub fn header_first(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| self.header(n))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, attaching `bearer` as the Authorization token when given.
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse>;

    fn name(&self) -> &'static str {
        "http"
    }
}
