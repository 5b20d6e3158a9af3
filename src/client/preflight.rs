//! Per-attempt gates: endpoint class admission and bearer selection.

use super::core::ClientInner;
use crate::client::request::ApiRequest;
use crate::Result;
use tracing::warn;

impl ClientInner {
    /// Resolve the endpoint class of `path` and spend one unit of its budget.
    pub(crate) fn admit(&self, path: &str) -> Result<String> {
        let class = self.limiter.class_for(path).to_string();
        if let Err(e) = self.limiter.check(&class) {
            warn!(endpoint_class = class.as_str(), path, "request rejected by rate limiter");
            return Err(e);
        }
        Ok(class)
    }

    /// Mutations, multipart uploads, explicitly authenticated reads and reads
    /// under a gated prefix carry the bearer token. Other reads go out bare.
    pub(crate) fn needs_auth(&self, request: &ApiRequest, path: &str) -> bool {
        request.require_auth
            || request.method.is_mutating()
            || request.payload.is_multipart()
            || self
                .config
                .auth
                .gated_get_prefixes
                .iter()
                .any(|p| path.starts_with(p.as_str()))
    }

    pub(crate) fn bearer_for(&self, request: &ApiRequest, path: &str) -> Option<String> {
        if self.needs_auth(request, path) {
            self.session.access_token()
        } else {
            None
        }
    }
}

/// Path prefix whose cached reads a successful mutation makes stale: the
/// first two segments, e.g. `/api/contacts` for `/api/contacts/9/notes`.
pub(crate) fn resource_root(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).take(2).collect();
    format!("/{}", segments.join("/"))
}
