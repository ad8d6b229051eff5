use crate::error_code::ErrorKind;
use crate::resilience::Operation;
use crate::Error;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use uuid::Uuid;

/// One image edit to run through the pipeline. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub id: Uuid,
    pub image: Bytes,
    pub mask: Option<Bytes>,
    /// Replaces the analysis text as the generation prompt when set.
    pub prompt: Option<String>,
    pub created_at: SystemTime,
    /// Overall deadline; supersedes per-stage timeouts.
    pub deadline: Option<Instant>,
}

impl PipelineRequest {
    pub fn new(image: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            image: image.into(),
            mask: None,
            prompt: None,
            created_at: SystemTime::now(),
            deadline: None,
        }
    }

    pub fn with_mask(mut self, mask: impl Into<Bytes>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

/// Pipeline-facing failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    PayloadTooLarge,
    Auth,
    Timeout,
    TransientNetwork,
    /// The breaker for the failing operation is open.
    ServiceUnavailable,
    Cancelled,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::PayloadTooLarge => "payload_too_large",
            FailureKind::Auth => "auth",
            FailureKind::Timeout => "timeout",
            FailureKind::TransientNetwork => "transient_network",
            FailureKind::ServiceUnavailable => "service_unavailable",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&Error> for FailureKind {
    fn from(err: &Error) -> Self {
        match err.kind() {
            ErrorKind::Validation => FailureKind::Validation,
            ErrorKind::PayloadTooLarge => FailureKind::PayloadTooLarge,
            ErrorKind::Auth => FailureKind::Auth,
            ErrorKind::Timeout | ErrorKind::DeadlineExceeded => FailureKind::Timeout,
            ErrorKind::TransientNetwork => FailureKind::TransientNetwork,
            ErrorKind::CircuitOpen => FailureKind::ServiceUnavailable,
            ErrorKind::Cancelled => FailureKind::Cancelled,
            ErrorKind::Configuration | ErrorKind::Internal => FailureKind::Internal,
        }
    }
}

/// Terminal result of one request. Built once and never mutated.
#[derive(Debug, Clone)]
pub enum PipelineResult {
    Success {
        request_id: Uuid,
        analysis_text: String,
        generated_image: Bytes,
        elapsed: Duration,
        /// Most attempts any single stage needed.
        attempts: u32,
    },
    Failure {
        request_id: Uuid,
        kind: FailureKind,
        message: String,
        attempts: u32,
    },
}

impl PipelineResult {
    pub fn request_id(&self) -> Uuid {
        match self {
            PipelineResult::Success { request_id, .. } | PipelineResult::Failure { request_id, .. } => {
                *request_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PipelineResult::Success { attempts, .. } | PipelineResult::Failure { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            PipelineResult::Failure { kind, .. } => Some(*kind),
            PipelineResult::Success { .. } => None,
        }
    }
}

/// Progress of one request, emitted in pipeline-phase order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Queued,
    /// The next stage is waiting for a slot or for room in the rate window.
    RateLimited { operation: Operation, wait: Duration },
    Analyzing,
    AnalysisComplete,
    Generating,
    GenerationComplete,
    /// The upcoming attempt number of the current stage.
    Retrying { operation: Operation, attempt: u32 },
    Failed { kind: FailureKind, message: String },
    Cancelled,
}

impl ProgressEvent {
    /// Stable short name, handy for logs and assertions.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Queued => "queued",
            ProgressEvent::RateLimited { .. } => "rate_limited",
            ProgressEvent::Analyzing => "analyzing",
            ProgressEvent::AnalysisComplete => "analysis_complete",
            ProgressEvent::Generating => "generating",
            ProgressEvent::GenerationComplete => "generation_complete",
            ProgressEvent::Retrying { .. } => "retrying",
            ProgressEvent::Failed { .. } => "failed",
            ProgressEvent::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::GenerationComplete
                | ProgressEvent::Failed { .. }
                | ProgressEvent::Cancelled
        )
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::RateLimited { operation, wait } => {
                write!(f, "rate_limited({}, {}ms)", operation, wait.as_millis())
            }
            ProgressEvent::Retrying { operation, attempt } => {
                write!(f, "retrying({}, attempt {})", operation, attempt)
            }
            ProgressEvent::Failed { kind, message } => write!(f, "failed({}): {}", kind, message),
            other => f.write_str(other.name()),
        }
    }
}
