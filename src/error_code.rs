//! 错误分类：定义管线的错误类别及其重试语义。
//!
//! Error taxonomy for the edit pipeline.
//!
//! Every [`crate::Error`] maps to exactly one [`ErrorKind`]. The kind decides whether the
//! retry policy may try again and how the failure is surfaced to the caller.
//!
//! | Code  | Kind               | Retryable | Category    |
//! |-------|--------------------|-----------|-------------|
//! | E1001 | `validation`       | no        | client      |
//! | E1002 | `auth`             | no        | client      |
//! | E1005 | `payload_too_large`| no        | client      |
//! | E3001 | `transient_network`| yes       | server      |
//! | E3002 | `circuit_open`     | no        | server      |
//! | E3003 | `timeout`          | yes       | server      |
//! | E4002 | `cancelled`        | no        | operational |
//! | E4003 | `deadline_exceeded`| no        | operational |
//! | E5001 | `configuration`    | no        | local       |
//! | E9999 | `internal`         | no        | unknown     |
//!
//! ## Example
//!
//! ```rust
//! use ai_edit_pipeline::error_code::ErrorKind;
//!
//! let kind = ErrorKind::from_http_status(503).unwrap();
//! assert_eq!(kind, ErrorKind::TransientNetwork);
//! assert!(kind.retryable());
//! assert_eq!(kind.code(), "E3001");
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// E1001: Bad input (empty image, empty prompt, 4xx from the service)
    Validation,
    /// E1002: Credential rejected by the service
    Auth,
    /// E1005: Image or mask exceeds the payload limit
    PayloadTooLarge,
    /// E3001: Network failure or 5xx-equivalent from the service
    TransientNetwork,
    /// E3002: Breaker is open; no remote call was attempted
    CircuitOpen,
    /// E3003: Attempt exceeded its timeout
    Timeout,
    /// E4002: Caller cancelled the request
    Cancelled,
    /// E4003: Caller-supplied overall deadline elapsed
    DeadlineExceeded,
    /// E5001: Invalid local configuration
    Configuration,
    /// E9999: Error could not be classified
    Internal,
}

impl ErrorKind {
    /// Returns the canonical code string (e.g., `"E1001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation => "E1001",
            Self::Auth => "E1002",
            Self::PayloadTooLarge => "E1005",
            Self::TransientNetwork => "E3001",
            Self::CircuitOpen => "E3002",
            Self::Timeout => "E3003",
            Self::Cancelled => "E4002",
            Self::DeadlineExceeded => "E4003",
            Self::Configuration => "E5001",
            Self::Internal => "E9999",
        }
    }

    /// Returns the snake_case name used in logs.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::PayloadTooLarge => "payload_too_large",
            Self::TransientNetwork => "transient_network",
            Self::CircuitOpen => "circuit_open",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }

    /// Only timeouts and transient network failures are retried.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::TransientNetwork)
    }

    /// Returns the category: `"client"`, `"server"`, `"operational"`, `"local"` or `"unknown"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation | Self::Auth | Self::PayloadTooLarge => "client",
            Self::TransientNetwork | Self::CircuitOpen | Self::Timeout => "server",
            Self::Cancelled | Self::DeadlineExceeded => "operational",
            Self::Configuration => "local",
            Self::Internal => "unknown",
        }
    }

    /// Classifies an HTTP status returned by the remote service.
    ///
    /// Returns `None` for non-error statuses.
    pub fn from_http_status(status: u16) -> Option<Self> {
        let kind = match status {
            401 | 403 => Self::Auth,
            413 => Self::PayloadTooLarge,
            // upstream timeouts carry no elapsed time of ours; retried like any transient failure
            408 | 429 | 504 => Self::TransientNetwork,
            400..=499 => Self::Validation,
            500..=599 => Self::TransientNetwork,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
