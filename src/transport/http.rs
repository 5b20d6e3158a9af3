use super::{RawResponse, Transport};
use crate::client::request::{ApiRequest, Method, Payload};
use crate::config::HttpConfig;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Proxy;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// reqwest-backed transport against a single backend.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(cfg: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .pool_max_idle_per_host(cfg.pool_max_idle_per_host)
            .pool_idle_timeout(Some(Duration::from_secs(cfg.pool_idle_timeout_secs)))
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &cfg.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy url: {}", e),
                    ErrorContext::new().with_field_path("proxy_url"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                format!("cannot build http client: {}", e),
                ErrorContext::new().with_source("http_transport"),
            )
        })?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `request`; the path is canonicalized exactly as the request key is.
    pub fn url_for(&self, request: &ApiRequest) -> String {
        format!("{}{}", self.base_url, request.descriptor().target())
    }

    fn build_form(parts: &[crate::client::request::MultipartPart]) -> Result<Form> {
        let mut form = Form::new();
        for p in parts {
            let mut part = Part::bytes(p.data.to_vec());
            if let Some(name) = &p.file_name {
                part = part.file_name(name.clone());
            }
            if let Some(mime) = &p.mime {
                part = part.mime_str(mime).map_err(|e| {
                    Error::validation_with_context(
                        format!("invalid mime type: {}", e),
                        ErrorContext::new().with_field_path(format!("multipart.{}", p.name)),
                    )
                })?;
            }
            form = form.part(p.name.clone(), part);
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse> {
        let url = self.url_for(request);
        let request_id = Uuid::new_v4().to_string();

        let mut req = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };
        req = req.header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        req = match &request.payload {
            Payload::None => req,
            Payload::Json(body) => req.json(body),
            Payload::Multipart(parts) => req.multipart(Self::build_form(parts)?),
        };

        let start = Instant::now();
        let resp = req
            .send()
            .await
            .map_err(|e| Error::network(format!("{} {}: {}", request.method, url, e)))?;

        let status = resp.status().as_u16();
        let headers: HashMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_ascii_lowercase(), v.to_str().ok()?.to_string())))
            .collect();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::network(format!("reading response body: {}", e)))?;

        debug!(
            request_id = request_id.as_str(),
            http_status = status,
            duration_ms = start.elapsed().as_millis() as u64,
            "{} {}",
            request.method,
            request.descriptor().path
        );

        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_uses_canonical_target() {
        let transport = HttpTransport::new(&HttpConfig {
            base_url: "https://api.example.com/".into(),
            ..HttpConfig::default()
        })
        .unwrap();
        let req = ApiRequest::get("/api/conversations/+15551234/messages").param("limit", 20);
        assert_eq!(
            transport.url_for(&req),
            "https://api.example.com/api/conversations/%2B15551234/messages?limit=20"
        );

        let raw = ApiRequest::get("/files/%FF");
        let url = transport.url_for(&raw);
        assert_eq!(url, "https://api.example.com/files/%FF");
        assert_eq!(url::Url::parse(&url).unwrap().path(), "/files/%FF");
    }
}
