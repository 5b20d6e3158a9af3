//! Turning a non-2xx response into a classified failure.

use crate::config::ErrorCodeConfig;
use crate::error_code::{classify, ErrorKind};
use crate::transport::RawResponse;
use crate::utils::json_path::PathMapper;
use crate::Error;
use serde_json::Value;
use std::time::Duration;

/// A classified non-2xx response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Failure {
    pub status: u16,
    pub kind: ErrorKind,
    pub code: Option<String>,
    pub message: String,
    /// Server-provided wait (`Retry-After` seconds or a millisecond body field).
    pub retry_hint: Option<Duration>,
}

impl Failure {
    pub fn from_response(resp: &RawResponse, cfg: &ErrorCodeConfig) -> Self {
        let code = PathMapper::first_string(&resp.body, &cfg.code_paths);
        let kind = classify(resp.status, code.as_deref(), false);
        Self {
            status: resp.status,
            kind,
            message: error_message(&resp.body, resp.status),
            retry_hint: retry_hint(resp, cfg),
            code,
        }
    }

    /// The error surfaced to the caller when no recovery applies.
    pub fn into_error(self) -> Error {
        Error::Remote {
            status: self.status,
            kind: self.kind,
            code: self.code,
            message: self.message,
        }
    }
}

fn error_message(body: &Value, status: u16) -> String {
    match body {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => PathMapper::first_string(body, &["message", "error.message", "error"])
            .unwrap_or_else(|| format!("HTTP {}", status)),
    }
}

/// `Retry-After: <seconds>` wins over body fields. The HTTP-date form is not supported.
fn retry_hint(resp: &RawResponse, cfg: &ErrorCodeConfig) -> Option<Duration> {
    if let Some(secs) = resp
        .header("retry-after")
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }
    PathMapper::first_u64(&resp.body, &cfg.retry_after_paths).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failure(resp: RawResponse) -> Failure {
        Failure::from_response(&resp, &ErrorCodeConfig::default())
    }

    #[test]
    fn test_expired_token_code_paths() {
        for body in [
            json!({"code": "TOKEN_EXPIRED"}),
            json!({"error": {"code": "jwt_expired", "message": "jwt expired"}}),
            json!({"errorCode": "TOKEN_EXPIRED"}),
        ] {
            let f = failure(RawResponse::new(401, body));
            assert_eq!(f.kind, ErrorKind::TokenExpired);
        }
    }

    #[test]
    fn test_message_sources() {
        let f = failure(RawResponse::new(400, json!({"error": {"message": "bad phone"}})));
        assert_eq!(f.message, "bad phone");
        assert_eq!(f.kind, ErrorKind::RequestRejected);

        let f = failure(RawResponse::new(502, json!("upstream down")));
        assert_eq!(f.message, "upstream down");
        assert_eq!(f.kind, ErrorKind::ServerError);

        let f = failure(RawResponse::new(404, Value::Null));
        assert_eq!(f.message, "HTTP 404");
    }

    #[test]
    fn test_retry_hint_header_then_body() {
        let f = failure(
            RawResponse::new(429, json!({"retryAfterMs": 1500})).with_header("Retry-After", "3"),
        );
        assert_eq!(f.retry_hint, Some(Duration::from_secs(3)));

        let f = failure(RawResponse::new(429, json!({"error": {"retryAfterMs": 1500}})));
        assert_eq!(f.retry_hint, Some(Duration::from_millis(1500)));
        assert_eq!(f.kind, ErrorKind::ServerRateLimited);

        let f = failure(RawResponse::new(429, Value::Null).with_header("retry-after", "soon"));
        assert_eq!(f.retry_hint, None);
    }

    #[test]
    fn test_into_error_keeps_code() {
        let err = failure(RawResponse::new(404, json!({"code": "CONTACT_NOT_FOUND"}))).into_error();
        assert_eq!(err.kind(), Some(ErrorKind::ResourceNotFound));
        assert!(err.to_string().contains("CONTACT_NOT_FOUND"));
    }
}
