//! 弹性模式模块：限流器、熔断器与重试策略。
//!
//! # Resilience Primitives Module
//!
//! This module provides the guards that sit between the pipeline and the remote AI service.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Sliding-window + concurrency-slot rate limiter |
//! | [`circuit_breaker`] | Failure-ratio circuit breaker, tracked per operation |
//! | [`retry`] | Exponential backoff with jitter for transient errors |
//! | [`registry`] | Per-operation ownership of limiters and breaker state |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: Normal operation, outcomes feed a bounded ring buffer
//! - **Open**: Failure ratio crossed the threshold, requests fail fast
//! - **Half-Open**: A single trial call tests whether the service recovered
//!
//! ```rust
//! use ai_edit_pipeline::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, Outcome};
//! use ai_edit_pipeline::resilience::Operation;
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_threshold(0.5)
//!     .with_open_duration(Duration::from_secs(15));
//! let breaker = CircuitBreaker::new(config);
//!
//! if let Ok(permit) = breaker.allow(Operation::Analyze) {
//!     // Make the remote call...
//!     breaker.record_outcome(permit, Outcome::Success);
//! }
//! ```
//!
//! ## Rate Limiter
//!
//! ```rust,no_run
//! use ai_edit_pipeline::context::CallContext;
//! use ai_edit_pipeline::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
//!
//! # async fn demo() -> ai_edit_pipeline::Result<()> {
//! let limiter = RateLimiter::new(
//!     RateLimiterConfig::new()
//!         .with_max_requests_per_minute(60)
//!         .with_max_concurrent(3),
//! );
//! let slot = limiter.acquire(&CallContext::new()).await?;
//! // Call the service while holding the slot...
//! limiter.release(slot);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod registry;
pub mod retry;
pub mod signals;

pub use registry::ResilienceRegistry;

use std::fmt;

/// Logical remote operation; limiter and breaker state are kept separately for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Analyze,
    Generate,
}

impl Operation {
    pub const ALL: [Operation; 2] = [Operation::Analyze, Operation::Generate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Analyze => "analyze",
            Operation::Generate => "generate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
