//! Request and response values flowing through the pipeline.

use crate::cache::{split_query, RequestDescriptor};
use crate::Result;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Everything except GET changes server state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a multipart upload.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: Option<String>,
    pub mime: Option<String>,
    pub data: Bytes,
}

impl MultipartPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            mime: None,
            data: Bytes::from(value.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            mime: Some(mime.into()),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    None,
    Json(serde_json::Value),
    Multipart(Vec<MultipartPart>),
}

impl Payload {
    pub fn is_present(&self) -> bool {
        !matches!(self, Payload::None)
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, Payload::Multipart(_))
    }
}

/// A request as submitted by the caller.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub payload: Payload,
    /// Attach the bearer token even for a read outside the gated prefixes.
    pub require_auth: bool,
    /// Cache this read even if its path is not in the cacheable prefixes.
    pub cache: bool,
}

impl ApiRequest {
    /// Query parameters embedded in `path` are lifted into `params`.
    pub fn new(method: Method, path: impl AsRef<str>) -> Self {
        let (path, params) = split_query(path.as_ref());
        Self {
            method,
            path,
            params,
            payload: Payload::None,
            require_auth: false,
            cache: false,
        }
    }

    pub fn get(path: impl AsRef<str>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl AsRef<str>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl AsRef<str>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl AsRef<str>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl AsRef<str>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.payload = Payload::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.payload = Payload::Json(body);
        self
    }

    pub fn multipart(mut self, parts: Vec<MultipartPart>) -> Self {
        self.payload = Payload::Multipart(parts);
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.require_auth = true;
        self
    }

    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }

    pub fn descriptor(&self) -> RequestDescriptor {
        RequestDescriptor::new(
            self.method,
            &self.path,
            &self.params,
            self.payload.is_present(),
        )
    }

    /// Reads without a body are coalesced and may be cached.
    pub fn is_idempotent_read(&self) -> bool {
        self.method == Method::Get && !self.payload.is_multipart()
    }
}

/// A successful (2xx) response. The body is shared between every caller
/// that received it from a coalesced call or the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Arc<serde_json::Value>,
    /// Served from the result cache rather than the network.
    pub from_cache: bool,
}

impl ApiResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: Arc::new(body),
            from_cache: false,
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(self.body.as_ref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_in_path_is_lifted() {
        let req = ApiRequest::get("/api/contacts?page=2").param("q", "ana");
        assert_eq!(req.path, "/api/contacts");
        assert_eq!(req.descriptor().target(), "/api/contacts?page=2&q=ana");
    }

    #[test]
    fn test_reads_and_mutations() {
        assert!(ApiRequest::get("/a").is_idempotent_read());
        assert!(!ApiRequest::post("/a").is_idempotent_read());
        assert!(!ApiRequest::get("/a")
            .multipart(vec![MultipartPart::text("k", "v")])
            .is_idempotent_read());
        assert!(Method::Delete.is_mutating());
        assert_eq!(Method::Patch.to_string(), "PATCH");
    }

    #[test]
    fn test_response_json() {
        #[derive(Deserialize)]
        struct Contact {
            id: u32,
        }
        let resp = ApiResponse::new(200, json!({"id": 4}));
        assert_eq!(resp.json::<Contact>().unwrap().id, 4);
        assert!(resp.json::<Vec<u32>>().is_err());
    }
}
