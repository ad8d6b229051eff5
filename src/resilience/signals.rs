use crate::resilience::circuit_breaker::CircuitBreakerSnapshot;
use crate::resilience::rate_limiter::RateLimiterSnapshot;
use crate::resilience::Operation;

/// A lightweight snapshot of resilience "signals" for one operation.
///
/// This is intentionally *facts only* (no policy). Applications can use it to render
/// "service busy" hints or to decide whether to submit more work.
#[derive(Debug, Clone)]
pub struct SignalsSnapshot {
    pub operation: Operation,
    pub rate_limiter: RateLimiterSnapshot,
    pub circuit_breaker: CircuitBreakerSnapshot,
}

impl SignalsSnapshot {
    /// True when a call right now would be rejected or made to wait.
    pub fn is_saturated(&self) -> bool {
        self.circuit_breaker.open_remaining_ms.is_some()
            || self.rate_limiter.available_slots == 0
            || self.rate_limiter.estimated_wait_ms.is_some()
    }
}
