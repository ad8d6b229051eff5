use crate::config::PipelineConfig;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::resilience::signals::SignalsSnapshot;
use crate::resilience::Operation;
use std::collections::HashMap;
use std::sync::Arc;

/// Owns the shared limiter and breaker state for every [`Operation`].
///
/// Created once per orchestrator and injected wherever slots or breaker permits are needed.
/// Two orchestrators built from separate registries never share state.
pub struct ResilienceRegistry {
    limiters: HashMap<Operation, Arc<RateLimiter>>,
    breaker: Arc<CircuitBreaker>,
}

impl ResilienceRegistry {
    pub fn new(limiter: RateLimiterConfig, breaker: CircuitBreakerConfig) -> Self {
        let limiters = Operation::ALL
            .into_iter()
            .map(|op| (op, Arc::new(RateLimiter::new(limiter.clone()))))
            .collect();
        Self {
            limiters,
            breaker: Arc::new(CircuitBreaker::new(breaker)),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.rate_limiter_config(), config.circuit_breaker_config())
    }

    pub fn limiter(&self, op: Operation) -> Arc<RateLimiter> {
        // every operation is populated in `new`
        self.limiters[&op].clone()
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    /// Snapshot current signals for `op`.
    pub async fn signals(&self, op: Operation) -> SignalsSnapshot {
        SignalsSnapshot {
            operation: op,
            rate_limiter: self.limiter(op).snapshot().await,
            circuit_breaker: self.breaker.snapshot(op),
        }
    }
}

impl Default for ResilienceRegistry {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
