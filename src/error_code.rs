//! Closed error taxonomy and the recovery policy attached to each kind.
//!
//! Every outcome of an outbound call is classified exactly once into an
//! [`ErrorKind`]; all downstream branching matches on that enum.
//!
//! | Kind | Trigger | Policy |
//! |------|---------|--------|
//! | `NetworkError` | no response received | surface |
//! | `RateLimitExceeded` | local pre-flight rejection | surface |
//! | `ServerRateLimited` | HTTP 429 | backoff bookkeeping, surface |
//! | `TokenExpired` | 401 + `TOKEN_EXPIRED` | refresh, replay once |
//! | `MalformedToken` / `InvalidToken` | 401 + code | terminate session |
//! | `UnhandledAuthError` | 401, unrecognized code | terminate session |
//! | `ResourceNotFound` | 404 or a `*_NOT_FOUND` code | surface |
//! | `ServerError` | 5xx | surface |
//! | `RequestRejected` | any other non-success status | surface |
//!
//! ## Example
//!
//! ```rust
//! use api_resilience::error_code::{classify, ErrorKind, RecoveryPolicy};
//!
//! let kind = classify(401, Some("TOKEN_EXPIRED"), false);
//! assert_eq!(kind, ErrorKind::TokenExpired);
//! assert_eq!(kind.policy(), RecoveryPolicy::RefreshAndReplay);
//! ```

use std::fmt;

/// Classified outcome of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response was received (connect failure, timeout, reset).
    NetworkError,
    /// Rejected locally by the rate limiter; never sent.
    RateLimitExceeded,
    /// HTTP 429 from the backend.
    ServerRateLimited,
    /// 401 with `TOKEN_EXPIRED`.
    TokenExpired,
    /// 401 with `MALFORMED_TOKEN`.
    MalformedToken,
    /// 401 with `INVALID_TOKEN`.
    InvalidToken,
    /// 401 without a recognized code.
    UnhandledAuthError,
    /// 404, or any status carrying a `*_NOT_FOUND` code.
    ResourceNotFound,
    /// 5xx.
    ServerError,
    /// Remaining non-success statuses (400, 403, 409, ...).
    RequestRejected,
}

/// What the pipeline does with a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Hand off to the refresh coordinator, then replay the request once.
    RefreshAndReplay,
    /// Clear the session and emit `authentication-failed`; no refresh.
    TerminateSession,
    /// Compute a backoff delay, record it against the endpoint class, surface.
    Backoff,
    /// Return the typed failure to the caller as-is.
    Surface,
}

/// Recognized backend error codes for 401 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCode {
    TokenExpired,
    MalformedToken,
    InvalidToken,
}

impl AuthCode {
    pub fn parse(code: &str) -> Option<Self> {
        match normalize_code(code).as_str() {
            "TOKEN_EXPIRED" | "JWT_EXPIRED" => Some(Self::TokenExpired),
            "MALFORMED_TOKEN" | "JWT_MALFORMED" => Some(Self::MalformedToken),
            "INVALID_TOKEN" | "JWT_INVALID" => Some(Self::InvalidToken),
            _ => None,
        }
    }
}

impl ErrorKind {
    /// Standard snake_case name used in logs and error messages.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ServerRateLimited => "server_rate_limited",
            Self::TokenExpired => "token_expired",
            Self::MalformedToken => "malformed_token",
            Self::InvalidToken => "invalid_token",
            Self::UnhandledAuthError => "unhandled_auth_error",
            Self::ResourceNotFound => "resource_not_found",
            Self::ServerError => "server_error",
            Self::RequestRejected => "request_rejected",
        }
    }

    /// The single recovery policy for this kind.
    #[inline]
    pub fn policy(&self) -> RecoveryPolicy {
        match self {
            Self::TokenExpired => RecoveryPolicy::RefreshAndReplay,
            Self::MalformedToken | Self::InvalidToken | Self::UnhandledAuthError => {
                RecoveryPolicy::TerminateSession
            }
            Self::ServerRateLimited => RecoveryPolicy::Backoff,
            Self::NetworkError
            | Self::RateLimitExceeded
            | Self::ResourceNotFound
            | Self::ServerError
            | Self::RequestRejected => RecoveryPolicy::Surface,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired | Self::MalformedToken | Self::InvalidToken | Self::UnhandledAuthError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Classify a call outcome.
///
/// `is_network_error` wins over everything else: no response means no status
/// worth looking at. Otherwise 401 and 429 are decided by status, and a
/// `*_NOT_FOUND` code marks a missing resource whatever the status.
pub fn classify(http_status: u16, error_code: Option<&str>, is_network_error: bool) -> ErrorKind {
    if is_network_error {
        return ErrorKind::NetworkError;
    }

    match http_status {
        401 => match error_code.and_then(AuthCode::parse) {
            Some(AuthCode::TokenExpired) => ErrorKind::TokenExpired,
            Some(AuthCode::MalformedToken) => ErrorKind::MalformedToken,
            Some(AuthCode::InvalidToken) => ErrorKind::InvalidToken,
            None => ErrorKind::UnhandledAuthError,
        },
        429 => ErrorKind::ServerRateLimited,
        _ if error_code.map(is_not_found_code).unwrap_or(false) => ErrorKind::ResourceNotFound,
        404 => ErrorKind::ResourceNotFound,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::RequestRejected,
    }
}

fn normalize_code(code: &str) -> String {
    code.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' | '.' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

fn is_not_found_code(code: &str) -> bool {
    let normalized = normalize_code(code);
    normalized == "NOT_FOUND" || normalized.ends_with("_NOT_FOUND")
}
