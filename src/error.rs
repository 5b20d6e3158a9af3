use crate::error_code::ErrorKind;
use std::sync::Arc;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "rate_limits.default.window_ms")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "rate_limiter", "session_store")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the resilience layer.
///
/// Cloneable so one settled outcome can be handed to every waiter of a
/// coalesced call or a refresh cycle.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rate limit exceeded for endpoint class '{class}'")]
    RateLimitExceeded { class: String },

    #[error("Server rate limited request (HTTP {status}); retry after {retry_after_ms}ms")]
    ServerRateLimited {
        status: u16,
        retry_after_ms: u64,
        message: String,
    },

    #[error("Remote error: HTTP {status} ({kind}){}: {message}", format_code(.code))]
    Remote {
        status: u16,
        kind: ErrorKind,
        code: Option<String>,
        message: String,
    },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Session storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::configuration_with_context(
            err.to_string(),
            ErrorContext::new().with_source("config_loader"),
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::configuration_with_context(
            err.to_string(),
            ErrorContext::new().with_source("io"),
        )
    }
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_code(code: &Option<String>) -> String {
    match code {
        Some(c) => format!(" [{}]", c),
        None => String::new(),
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network {
            message: msg.into(),
        }
    }

    pub fn authentication_failed(reason: impl Into<String>) -> Self {
        Error::AuthenticationFailed {
            reason: reason.into(),
        }
    }

    /// The classified kind of this error, if it belongs to the taxonomy.
    ///
    /// Configuration, validation and internal errors are not part of the
    /// request-outcome taxonomy and return `None`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Network { .. } => Some(ErrorKind::NetworkError),
            Error::RateLimitExceeded { .. } => Some(ErrorKind::RateLimitExceeded),
            Error::ServerRateLimited { .. } => Some(ErrorKind::ServerRateLimited),
            Error::Remote { kind, .. } => Some(*kind),
            Error::AuthenticationFailed { .. } => Some(ErrorKind::UnhandledAuthError),
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// HTTP status carried by the error, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ServerRateLimited { status, .. } | Error::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Error::AuthenticationFailed { .. })
    }
}
