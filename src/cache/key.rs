//! Canonical request identity.
//!
//! The same canonicalization feeds the dedup/cache key and the URL the
//! transport actually sends, so the two can never disagree about which
//! resource a request targets.

use crate::client::request::Method;
use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// URL path-segment set, plus `+`.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%')
    .add(b'\\')
    .add(b'+');

/// Immutable description of a request, normalized once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Canonical, percent-encoded path (see [`canonical_path`]).
    pub path: String,
    /// Query parameters sorted by key, then value.
    pub normalized_params: Vec<(String, String)>,
    pub body_present: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: &str, params: &[(String, String)], body_present: bool) -> Self {
        Self {
            method,
            path: canonical_path(path),
            normalized_params: normalize_params(params),
            body_present,
        }
    }

    /// `k=v&k2=v2` in canonical order, empty when there are no params.
    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.normalized_params.iter())
            .finish()
    }

    /// Path plus query, exactly as sent on the wire.
    pub fn target(&self) -> String {
        let query = self.query_string();
        if query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, query)
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::from_canonical(format!("{}:{}", self.method, self.target()))
    }
}

/// Stable identity of a request: `METHOD:path?sortedParams` plus its SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub canonical: String,
    pub hash: String,
}

impl RequestKey {
    /// Build the key for `method` + `path` + `params`.
    ///
    /// Parameter order and path escaping do not affect the result.
    pub fn build(method: Method, path: &str, params: &[(String, String)]) -> Self {
        RequestDescriptor::new(method, path, params, false).key()
    }

    fn from_canonical(canonical: String) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Self { canonical, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }

    /// Canonical path component (without method or query).
    pub fn path(&self) -> &str {
        let after_method = self
            .canonical
            .split_once(':')
            .map(|(_, rest)| rest)
            .unwrap_or(&self.canonical);
        after_method.split('?').next().unwrap_or(after_method)
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

/// Canonical encoding of a request path.
///
/// Each segment is percent-decoded once to raw bytes and re-encoded with the
/// URL path-segment set, with `+` always written as `%2B` (servers differ on
/// whether a literal `+` in a path means a space). Bytes that are not valid
/// UTF-8 survive as their `%XX` escapes. Empty and `.` segments are
/// dropped, `..` pops, and the result always starts with `/` and never ends
/// with one (except the root). Applying it twice yields the same string.
pub fn canonical_path(path: &str) -> String {
    let raw = path.split(['?', '#']).next().unwrap_or("");
    let mut segments: Vec<String> = Vec::new();
    for seg in raw.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => {
                let bytes: Vec<u8> = percent_decode_str(other).collect();
                segments.push(percent_encode(&bytes, SEGMENT).to_string());
            }
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

/// Split `path?query` into the path and its decoded query pairs.
pub fn split_query(path: &str) -> (String, Vec<(String, String)>) {
    match path.split_once('?') {
        Some((p, q)) => {
            let q = q.split('#').next().unwrap_or("");
            let pairs = form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            (p.to_string(), pairs)
        }
        None => (path.to_string(), Vec::new()),
    }
}

fn normalize_params(params: &[(String, String)]) -> Vec<(String, String)> {
    let mut sorted = params.to_vec();
    sorted.sort();
    sorted
}
