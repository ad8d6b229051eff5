//! 管线配置：默认值、配置文件与环境变量覆盖。
//!
//! Pipeline configuration.
//!
//! Values are resolved in three layers:
//!
//! 1. Built-in defaults ([`PipelineConfig::default`])
//! 2. An optional YAML (or JSON) file ([`PipelineConfig::from_file`])
//! 3. `AI_EDIT_*` environment variables ([`PipelineConfig::apply_env`])
//!
//! | Key | Env | Default |
//! |-----|-----|---------|
//! | `maxRequestsPerMinute` | `AI_EDIT_MAX_RPM` | 60 |
//! | `maxConcurrent` | `AI_EDIT_MAX_CONCURRENT` | 3 |
//! | `breakerThreshold` | `AI_EDIT_BREAKER_THRESHOLD` | 0.5 |
//! | `breakerMinSamples` | `AI_EDIT_BREAKER_MIN_SAMPLES` | 5 |
//! | `breakerWindowSize` | `AI_EDIT_BREAKER_WINDOW_SIZE` | 5 |
//! | `breakerOpenDurationMs` | `AI_EDIT_BREAKER_OPEN_MS` | 15000 |
//! | `retryMaxAttempts` | `AI_EDIT_RETRY_MAX_ATTEMPTS` | 3 |
//! | `retryBaseBackoffMs` | `AI_EDIT_RETRY_BASE_MS` | 500 |
//! | `retryMaxBackoffMs` | `AI_EDIT_RETRY_MAX_MS` | 8000 |
//! | `analyzeTimeoutMs` | `AI_EDIT_ANALYZE_TIMEOUT_MS` | 30000 |
//! | `generateTimeoutMs` | `AI_EDIT_GENERATE_TIMEOUT_MS` | 60000 |
//! | `maxPayloadBytes` | `AI_EDIT_MAX_PAYLOAD_BYTES` | 20 MiB |
//!
//! Duration keys also accept their name without the `Ms` suffix (`analyzeTimeout`, ...);
//! values are always milliseconds. Unknown keys are rejected.

use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::rate_limiter::RateLimiterConfig;
use crate::resilience::retry::RetryConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub max_requests_per_minute: usize,
    pub max_concurrent: usize,
    pub breaker_threshold: f64,
    pub breaker_min_samples: usize,
    pub breaker_window_size: usize,
    #[serde(alias = "breakerOpenDuration")]
    pub breaker_open_duration_ms: u64,
    pub retry_max_attempts: u32,
    #[serde(alias = "retryBaseBackoff")]
    pub retry_base_backoff_ms: u64,
    #[serde(alias = "retryMaxBackoff")]
    pub retry_max_backoff_ms: u64,
    #[serde(alias = "analyzeTimeout")]
    pub analyze_timeout_ms: u64,
    #[serde(alias = "generateTimeout")]
    pub generate_timeout_ms: u64,
    pub max_payload_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            max_concurrent: 3,
            breaker_threshold: 0.5,
            breaker_min_samples: 5,
            breaker_window_size: 5,
            breaker_open_duration_ms: 15_000,
            retry_max_attempts: 3,
            retry_base_backoff_ms: 500,
            retry_max_backoff_ms: 8_000,
            analyze_timeout_ms: 30_000,
            generate_timeout_ms: 60_000,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::configuration_with_context(
                format!("invalid value '{}'", raw),
                ErrorContext::new().with_details(name).with_source("config_env"),
            )
        }),
        Err(_) => Ok(None),
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML or JSON document. Missing keys keep their defaults.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::configuration_with_context(
                e.to_string(),
                ErrorContext::new()
                    .with_details(path.as_ref().display().to_string())
                    .with_source("config_file"),
            )
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults, then the file at `path` (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let cfg = base.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `AI_EDIT_*` environment overrides.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Some(v) = env_parse("AI_EDIT_MAX_RPM")? {
            self.max_requests_per_minute = v;
        }
        if let Some(v) = env_parse("AI_EDIT_MAX_CONCURRENT")? {
            self.max_concurrent = v;
        }
        if let Some(v) = env_parse("AI_EDIT_BREAKER_THRESHOLD")? {
            self.breaker_threshold = v;
        }
        if let Some(v) = env_parse("AI_EDIT_BREAKER_MIN_SAMPLES")? {
            self.breaker_min_samples = v;
        }
        if let Some(v) = env_parse("AI_EDIT_BREAKER_WINDOW_SIZE")? {
            self.breaker_window_size = v;
        }
        if let Some(v) = env_parse("AI_EDIT_BREAKER_OPEN_MS")? {
            self.breaker_open_duration_ms = v;
        }
        if let Some(v) = env_parse("AI_EDIT_RETRY_MAX_ATTEMPTS")? {
            self.retry_max_attempts = v;
        }
        if let Some(v) = env_parse("AI_EDIT_RETRY_BASE_MS")? {
            self.retry_base_backoff_ms = v;
        }
        if let Some(v) = env_parse("AI_EDIT_RETRY_MAX_MS")? {
            self.retry_max_backoff_ms = v;
        }
        if let Some(v) = env_parse("AI_EDIT_ANALYZE_TIMEOUT_MS")? {
            self.analyze_timeout_ms = v;
        }
        if let Some(v) = env_parse("AI_EDIT_GENERATE_TIMEOUT_MS")? {
            self.generate_timeout_ms = v;
        }
        if let Some(v) = env_parse("AI_EDIT_MAX_PAYLOAD_BYTES")? {
            self.max_payload_bytes = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |field: &str, msg: &str| -> Result<()> {
            Err(Error::configuration_with_context(
                msg.to_string(),
                ErrorContext::new().with_details(field.to_string()).with_source("config_validate"),
            ))
        };

        if self.max_requests_per_minute == 0 {
            return fail("maxRequestsPerMinute", "must be at least 1");
        }
        if self.max_concurrent == 0 {
            return fail("maxConcurrent", "must be at least 1");
        }
        if !(self.breaker_threshold > 0.0 && self.breaker_threshold <= 1.0) {
            return fail("breakerThreshold", "must be in (0, 1]");
        }
        if self.breaker_window_size == 0 {
            return fail("breakerWindowSize", "must be at least 1");
        }
        if self.breaker_min_samples == 0 || self.breaker_min_samples > self.breaker_window_size {
            return fail("breakerMinSamples", "must be in [1, breakerWindowSize]");
        }
        if self.retry_max_attempts == 0 {
            return fail("retryMaxAttempts", "must be at least 1");
        }
        if self.retry_base_backoff_ms > self.retry_max_backoff_ms {
            return fail("retryBaseBackoffMs", "must not exceed retryMaxBackoffMs");
        }
        if self.analyze_timeout_ms == 0 || self.generate_timeout_ms == 0 {
            return fail("analyzeTimeoutMs/generateTimeoutMs", "must be positive");
        }
        if self.max_payload_bytes == 0 {
            return fail("maxPayloadBytes", "must be positive");
        }
        Ok(())
    }

    pub fn with_max_requests_per_minute(mut self, rpm: usize) -> Self {
        self.max_requests_per_minute = rpm;
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_breaker_open_duration(mut self, d: Duration) -> Self {
        self.breaker_open_duration_ms = d.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, base: Duration, max: Duration) -> Self {
        self.retry_max_attempts = max_attempts;
        self.retry_base_backoff_ms = base.as_millis() as u64;
        self.retry_max_backoff_ms = max.as_millis() as u64;
        self
    }

    pub fn with_timeouts(mut self, analyze: Duration, generate: Duration) -> Self {
        self.analyze_timeout_ms = analyze.as_millis() as u64;
        self.generate_timeout_ms = generate.as_millis() as u64;
        self
    }

    pub fn with_max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_millis(self.analyze_timeout_ms)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_millis(self.generate_timeout_ms)
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::new()
            .with_max_requests_per_minute(self.max_requests_per_minute)
            .with_max_concurrent(self.max_concurrent)
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_threshold(self.breaker_threshold)
            .with_min_samples(self.breaker_min_samples)
            .with_window_size(self.breaker_window_size)
            .with_open_duration(Duration::from_millis(self.breaker_open_duration_ms))
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.retry_max_attempts)
            .with_backoff(
                Duration::from_millis(self.retry_base_backoff_ms),
                Duration::from_millis(self.retry_max_backoff_ms),
            )
    }
}
