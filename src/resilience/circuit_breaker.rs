use crate::resilience::Operation;
use crate::{Error, ErrorContext, Result};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Result of a guarded call as seen by the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Caller-initiated abort; never counted against the dependency.
    Neutral,
}

impl Outcome {
    /// Classify a call result.
    ///
    /// Only failures that say something about the dependency's health count: timeouts,
    /// transient network errors and internal errors. Rejected input, rejected credentials and
    /// caller aborts are neutral.
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(Error::Timeout { .. })
            | Err(Error::TransientNetwork { .. })
            | Err(Error::Internal { .. }) => Outcome::Failure,
            Err(_) => Outcome::Neutral,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub operation: Operation,
    pub state: BreakerState,
    pub samples: usize,
    pub failures: usize,
    pub failure_ratio: f64,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
    pub trial_in_flight: bool,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0, 1] at which the breaker opens.
    pub threshold: f64,
    /// Minimum outcomes in the log before the ratio is evaluated.
    pub min_samples: usize,
    /// Capacity of the outcome ring buffer.
    pub window_size: usize,
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_samples: 5,
            window_size: 5,
            open_duration: Duration::from_secs(15),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_open_duration(mut self, open_duration: Duration) -> Self {
        self.open_duration = open_duration;
        self
    }
}

/// Admission granted by [`CircuitBreaker::allow`].
///
/// Must be handed back to [`CircuitBreaker::record_outcome`]. A trial permit dropped without an
/// outcome keeps the half-open probe slot occupied; use [`CircuitBreaker::guard`] when the call
/// may be abandoned mid-flight.
#[derive(Debug)]
#[must_use = "pass the permit to CircuitBreaker::record_outcome"]
pub struct BreakerPermit {
    operation: Operation,
    generation: u64,
    trial: bool,
}

impl BreakerPermit {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// True when this call is the single half-open probe.
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

/// Scoped [`BreakerPermit`].
pub struct BreakerGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Option<BreakerPermit>,
}

impl BreakerGuard<'_> {
    pub fn is_trial(&self) -> bool {
        self.permit.as_ref().is_some_and(|p| p.trial)
    }

    pub fn finish(mut self, outcome: Outcome) {
        if let Some(permit) = self.permit.take() {
            self.breaker.record_outcome(permit, outcome);
        }
    }
}

impl Drop for BreakerGuard<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.record_outcome(permit, Outcome::Neutral);
        }
    }
}

#[derive(Debug)]
struct Cell {
    state: BreakerState,
    outcomes: VecDeque<bool>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    /// Bumped on every state transition; stale permits are ignored.
    generation: u64,
}

impl Cell {
    fn new(capacity: usize) -> Self {
        Self {
            state: BreakerState::Closed,
            outcomes: VecDeque::with_capacity(capacity),
            opened_at: None,
            trial_in_flight: false,
            generation: 0,
        }
    }

    fn failures(&self) -> usize {
        self.outcomes.iter().filter(|ok| !**ok).count()
    }

    fn transition(&mut self, to: BreakerState) {
        self.state = to;
        self.generation = self.generation.wrapping_add(1);
        self.trial_in_flight = false;
        match to {
            BreakerState::Open => {
                self.opened_at = Some(Instant::now());
                self.outcomes.clear();
            }
            BreakerState::Closed => {
                self.opened_at = None;
                self.outcomes.clear();
            }
            BreakerState::HalfOpen => {}
        }
    }
}

/// Failure-ratio circuit breaker tracked independently per [`Operation`].
///
/// - Closed: outcomes go into a bounded ring buffer; opens once `min_samples` are present
///   and the failure ratio reaches `threshold`
/// - Open: rejects with [`Error::CircuitOpen`] until `open_duration` has elapsed
/// - HalfOpen: admits exactly one trial; success closes, failure re-opens
///
/// All transitions happen under one lock, so two callers can never both flip Open→HalfOpen.
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    cells: std::sync::Mutex<HashMap<Operation, Cell>>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        let cfg = CircuitBreakerConfig {
            window_size: cfg.window_size.max(1),
            min_samples: cfg.min_samples.max(1),
            ..cfg
        };
        Self {
            cfg,
            cells: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Operation, Cell>>> {
        self.cells.lock().map_err(|_| {
            Error::internal_with_context(
                "CircuitBreaker poisoned",
                ErrorContext::new().with_source("circuit_breaker"),
            )
        })
    }

    /// Ask to place a call for `op`.
    pub fn allow(&self, op: Operation) -> Result<BreakerPermit> {
        let mut cells = self.lock()?;
        let cell = cells
            .entry(op)
            .or_insert_with(|| Cell::new(self.cfg.window_size));

        match cell.state {
            BreakerState::Closed => Ok(BreakerPermit {
                operation: op,
                generation: cell.generation,
                trial: false,
            }),
            BreakerState::Open => {
                let opened_at = cell.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed < self.cfg.open_duration {
                    return Err(Error::CircuitOpen {
                        operation: op.as_str().to_string(),
                        retry_in_ms: Some((self.cfg.open_duration - elapsed).as_millis() as u64),
                    });
                }
                cell.transition(BreakerState::HalfOpen);
                cell.trial_in_flight = true;
                info!(operation = op.as_str(), "circuit breaker half-open, admitting trial");
                Ok(BreakerPermit {
                    operation: op,
                    generation: cell.generation,
                    trial: true,
                })
            }
            BreakerState::HalfOpen => {
                if cell.trial_in_flight {
                    return Err(Error::CircuitOpen {
                        operation: op.as_str().to_string(),
                        retry_in_ms: None,
                    });
                }
                cell.trial_in_flight = true;
                Ok(BreakerPermit {
                    operation: op,
                    generation: cell.generation,
                    trial: true,
                })
            }
        }
    }

    /// Like [`allow`](Self::allow), but the returned guard reports `Outcome::Neutral` if it is
    /// dropped before [`BreakerGuard::finish`].
    pub fn guard(&self, op: Operation) -> Result<BreakerGuard<'_>> {
        let permit = self.allow(op)?;
        Ok(BreakerGuard {
            breaker: self,
            permit: Some(permit),
        })
    }

    /// Report how the call admitted by `permit` ended.
    pub fn record_outcome(&self, permit: BreakerPermit, outcome: Outcome) {
        let Ok(mut cells) = self.lock() else {
            return;
        };
        let Some(cell) = cells.get_mut(&permit.operation) else {
            return;
        };
        if cell.generation != permit.generation {
            return;
        }
        let op = permit.operation.as_str();

        match (cell.state, outcome) {
            (BreakerState::HalfOpen, Outcome::Success) => {
                cell.transition(BreakerState::Closed);
                info!(operation = op, "circuit breaker closed after successful trial");
            }
            (BreakerState::HalfOpen, Outcome::Failure) => {
                cell.transition(BreakerState::Open);
                warn!(operation = op, "circuit breaker re-opened after failed trial");
            }
            (BreakerState::HalfOpen, Outcome::Neutral) => {
                cell.trial_in_flight = false;
            }
            (BreakerState::Closed, Outcome::Neutral) => {}
            (BreakerState::Closed, outcome) => {
                if cell.outcomes.len() == self.cfg.window_size {
                    cell.outcomes.pop_front();
                }
                cell.outcomes.push_back(outcome == Outcome::Success);

                let samples = cell.outcomes.len();
                if samples >= self.cfg.min_samples {
                    let ratio = cell.failures() as f64 / samples as f64;
                    if ratio >= self.cfg.threshold {
                        cell.transition(BreakerState::Open);
                        warn!(
                            operation = op,
                            failure_ratio = ratio,
                            samples,
                            open_ms = self.cfg.open_duration.as_millis() as u64,
                            "circuit breaker opened"
                        );
                    }
                }
            }
            (BreakerState::Open, _) => {}
        }
    }

    pub fn state(&self, op: Operation) -> BreakerState {
        self.lock()
            .ok()
            .and_then(|cells| cells.get(&op).map(|c| c.state))
            .unwrap_or(BreakerState::Closed)
    }

    pub fn snapshot(&self, op: Operation) -> CircuitBreakerSnapshot {
        let empty = CircuitBreakerSnapshot {
            operation: op,
            state: BreakerState::Closed,
            samples: 0,
            failures: 0,
            failure_ratio: 0.0,
            open_remaining_ms: None,
            trial_in_flight: false,
        };
        let Ok(cells) = self.lock() else {
            return empty;
        };
        let Some(cell) = cells.get(&op) else {
            return empty;
        };

        let samples = cell.outcomes.len();
        let failures = cell.failures();
        let open_remaining_ms = match (cell.state, cell.opened_at) {
            (BreakerState::Open, Some(at)) => {
                let elapsed = at.elapsed();
                (elapsed < self.cfg.open_duration)
                    .then(|| (self.cfg.open_duration - elapsed).as_millis() as u64)
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            operation: op,
            state: cell.state,
            samples,
            failures,
            failure_ratio: if samples == 0 {
                0.0
            } else {
                failures as f64 / samples as f64
            },
            open_remaining_ms,
            trial_in_flight: cell.trial_in_flight,
        }
    }
}
