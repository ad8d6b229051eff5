use crate::context::CallContext;
use crate::{Error, ErrorContext, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub max_requests_per_window: usize,
    pub window_ms: u64,
    /// Admissions still inside the trailing window.
    pub in_window: usize,
    pub max_concurrent: usize,
    pub available_slots: usize,
    /// Estimated wait until the window has room again (ms), if currently full.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Admissions allowed per trailing window.
    pub max_requests_per_window: usize,
    /// Concurrency slots (in-flight calls).
    pub max_concurrent: usize,
    /// Length of the sliding window.
    pub window: Duration,
}

impl RateLimiterConfig {
    pub fn new() -> Self {
        Self {
            max_requests_per_window: 60,
            max_concurrent: 3,
            window: Duration::from_secs(60),
        }
    }

    /// Set the per-minute request budget (uses a 60s window).
    pub fn with_max_requests_per_minute(mut self, rpm: usize) -> Self {
        self.max_requests_per_window = rpm;
        self.window = Duration::from_secs(60);
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_window(mut self, max_requests: usize, window: Duration) -> Self {
        self.max_requests_per_window = max_requests;
        self.window = window;
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Concurrency permit returned by [`RateLimiter::acquire`].
///
/// The underlying permit goes back to the pool exactly once, when the slot is dropped, so
/// every exit path (error, cancellation, panic unwinding) releases it.
#[derive(Debug)]
pub struct RequestSlot {
    _permit: OwnedSemaphorePermit,
    admitted_at: Instant,
}

impl RequestSlot {
    pub fn admitted_at(&self) -> Instant {
        self.admitted_at
    }
}

/// Sliding-window rate limiter with a bounded concurrency pool.
///
/// - Concurrency is bounded by a semaphore of `max_concurrent` slots
/// - Admissions are bounded to `max_requests_per_window` per trailing `window`
/// - All waits observe the caller's [`CallContext`]
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    slots: Arc<Semaphore>,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        let max_concurrent = cfg.max_concurrent.max(1);
        let capacity = cfg.max_requests_per_window.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            cfg: RateLimiterConfig {
                max_requests_per_window: capacity,
                max_concurrent,
                window: cfg.window,
            },
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    fn prune_locked(cfg: &RateLimiterConfig, window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= cfg.window {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Acquire a slot, waiting for both a free concurrency slot and room in the window.
    pub async fn acquire(&self, ctx: &CallContext) -> Result<RequestSlot> {
        self.acquire_observed(ctx, |_| {}).await
    }

    /// Like [`acquire`](Self::acquire), calling `on_wait` the first time the caller is held back.
    ///
    /// `on_wait` receives the wait estimate (zero when blocked on the concurrency pool).
    pub async fn acquire_observed<F>(&self, ctx: &CallContext, mut on_wait: F) -> Result<RequestSlot>
    where
        F: FnMut(Duration),
    {
        let mut notified = false;

        // 1. Concurrency slot
        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                notified = true;
                on_wait(Duration::ZERO);
                ctx.run(self.slots.clone().acquire_owned())
                    .await?
                    .map_err(|_| {
                        Error::internal_with_context(
                            "rate limiter slot pool closed",
                            ErrorContext::new().with_source("rate_limiter"),
                        )
                    })?
            }
        };

        // 2. Window admission (the permit is held while waiting and dropped on any error)
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                Self::prune_locked(&self.cfg, &mut window, now);

                if window.len() < self.cfg.max_requests_per_window {
                    window.push_back(now);
                    return Ok(RequestSlot {
                        _permit: permit,
                        admitted_at: now,
                    });
                }

                match window.front() {
                    Some(&oldest) => (oldest + self.cfg.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(
                wait_ms = wait.as_millis() as u64,
                limit = self.cfg.max_requests_per_window,
                "rate window full, waiting"
            );
            if !notified {
                notified = true;
                on_wait(wait);
            }
            ctx.sleep(wait).await?;
        }
    }

    /// Try to acquire a slot without waiting.
    pub async fn try_acquire(&self) -> Option<RequestSlot> {
        let permit = self.slots.clone().try_acquire_owned().ok()?;
        let mut window = self.window.lock().await;
        let now = Instant::now();
        Self::prune_locked(&self.cfg, &mut window, now);
        if window.len() < self.cfg.max_requests_per_window {
            window.push_back(now);
            Some(RequestSlot {
                _permit: permit,
                admitted_at: now,
            })
        } else {
            None
        }
    }

    /// Return a slot to the pool. Equivalent to dropping it.
    pub fn release(&self, slot: RequestSlot) {
        drop(slot);
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        Self::prune_locked(&self.cfg, &mut window, now);

        let estimated_wait_ms = if window.len() >= self.cfg.max_requests_per_window {
            window
                .front()
                .map(|&oldest| (oldest + self.cfg.window).saturating_duration_since(now))
                .map(|d| d.as_millis() as u64)
        } else {
            None
        };

        RateLimiterSnapshot {
            max_requests_per_window: self.cfg.max_requests_per_window,
            window_ms: self.cfg.window.as_millis() as u64,
            in_window: window.len(),
            max_concurrent: self.cfg.max_concurrent,
            available_slots: self.slots.available_permits(),
            estimated_wait_ms,
        }
    }
}
