use crate::error_code::ErrorKind;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Component that raised the error (e.g., "rate_limiter", "http_transport")
    pub source: Option<String>,
    /// Additional context about the error (e.g., upstream request id, body excerpt)
    pub details: Option<String>,
    /// Operation the error belongs to ("analyze" / "generate")
    pub operation: Option<String>,
    /// HTTP status observed at the transport boundary, if any
    pub status_code: Option<u16>,
    /// Correlation id sent with the remote call
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Unified error type for the edit pipeline.
///
/// Every variant maps onto exactly one [`ErrorKind`]; raw transport errors are classified
/// into these variants at the HTTP boundary and never escape as-is.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes{}", format_context(.context))]
    PayloadTooLarge {
        size: usize,
        limit: usize,
        context: ErrorContext,
    },

    #[error("Authentication rejected: {message}{}", format_context(.context))]
    Auth {
        message: String,
        context: ErrorContext,
    },

    #[error("Timed out after {elapsed_ms}ms{}", format_context(.context))]
    Timeout {
        elapsed_ms: u64,
        context: ErrorContext,
    },

    #[error("Transient network error: {message}{}", format_context(.context))]
    TransientNetwork {
        message: String,
        context: ErrorContext,
    },

    #[error("Circuit breaker open for '{operation}'")]
    CircuitOpen {
        operation: String,
        /// Remaining open time, if the breaker is in its cooldown.
        retry_in_ms: Option<u64>,
    },

    #[error("Cancelled by caller")]
    Cancelled,

    #[error("Overall deadline exceeded")]
    DeadlineExceeded,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Internal error: {message}{}", format_context(.context))]
    Internal {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref op) = ctx.operation {
        parts.push(format!("operation: {}", op));
    }
    if let Some(status) = ctx.status_code {
        parts.push(format!("status: {}", status));
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

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::validation_with_context(msg, ErrorContext::new())
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn auth_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Auth {
            message: msg.into(),
            context,
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::transient_with_context(msg, ErrorContext::new())
    }

    pub fn transient_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::TransientNetwork {
            message: msg.into(),
            context,
        }
    }

    pub fn timeout(elapsed: std::time::Duration, context: ErrorContext) -> Self {
        Error::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn internal_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Internal {
            message: msg.into(),
            context,
        }
    }

    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Error::Auth { .. } => ErrorKind::Auth,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::TransientNetwork { .. } => ErrorKind::TransientNetwork,
            Error::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the retry policy may attempt the call again.
    pub fn is_retryable(&self) -> bool {
        self.kind().retryable()
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Validation { context, .. }
            | Error::PayloadTooLarge { context, .. }
            | Error::Auth { context, .. }
            | Error::Timeout { context, .. }
            | Error::TransientNetwork { context, .. }
            | Error::Configuration { context, .. }
            | Error::Internal { context, .. } => Some(context),
            _ => None,
        }
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

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::configuration_with_context(
            err.to_string(),
            ErrorContext::new().with_source("config_parse"),
        )
    }
}
