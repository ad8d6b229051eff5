//! # ai-edit-pipeline
//!
//! 面向不可靠远程 AI 服务的弹性请求编排：限流、熔断、重试与可取消的两阶段流水线。
//!
//! Resilient orchestration of image edit requests against a remote AI service.
//!
//! ## Overview
//!
//! A request carries an image (and optionally a mask and a prompt). The pipeline first asks the
//! service to analyze the image, then to generate an edited image from the analysis text or the
//! caller's prompt. The remote service is treated as unreliable, rate-limited and slow, so every
//! call is wrapped in:
//!
//! - **Rate limiting**: a sliding 60 s window plus a bounded pool of concurrency slots
//! - **Circuit breaking**: per-operation, failure-ratio based, with a single half-open trial
//! - **Retries**: exponential backoff with jitter for timeouts and transient network errors
//! - **Cancellation**: every wait races the caller's token and overall deadline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_edit_pipeline::client::{HttpClientBuilder, StaticCredential};
//! use ai_edit_pipeline::pipeline::{Orchestrator, PipelineRequest};
//! use ai_edit_pipeline::{CallContext, PipelineConfig};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ai_edit_pipeline::Result<()> {
//!     let client = HttpClientBuilder::new()
//!         .base_url("https://edit.example.com")
//!         .credential(Arc::new(StaticCredential::new("your-api-key")))
//!         .build()?;
//!     let orchestrator = Orchestrator::new(Arc::new(client), PipelineConfig::default())?;
//!
//!     let image = std::fs::read("photo.jpg")?;
//!     let mut run = orchestrator.run(&CallContext::new(), PipelineRequest::new(image));
//!     if let Some(mut events) = run.events() {
//!         while let Some(event) = events.next().await {
//!             println!("{}", event);
//!         }
//!     }
//!     let result = run.result().await;
//!     println!("success: {}", result.is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | Orchestrator, progress events, request/result types |
//! | [`resilience`] | Rate limiter, circuit breaker, retry policy, registry |
//! | [`client`] | `RemoteAiClient` trait, validation, credentials, HTTP builder |
//! | [`transport`] | reqwest adapter and error classification |
//! | [`context`] | Cancellation token plus deadline passed through every call |
//! | [`config`] | `PipelineConfig` loading (file, env) and validation |
//! | [`sink`] | Persistence collaborator for terminal results |
//! | [`error`] / [`error_code`] | Error type and stable error kinds |

pub mod client;
pub mod config;
pub mod context;
pub mod error_code;
pub mod pipeline;
pub mod resilience;
pub mod sink;
pub mod transport;

pub use client::{HttpClientBuilder, RemoteAiClient};
pub use config::PipelineConfig;
pub use context::CallContext;
pub use error_code::ErrorKind;
pub use pipeline::{
    FailureKind, Orchestrator, PipelineRequest, PipelineResult, PipelineRun, ProgressEvent,
};
pub use resilience::ResilienceRegistry;
pub use sink::{InMemoryResultSink, NoopResultSink, ResultSink};

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

/// A specialized Result type for the library
pub type Result<T> = std::result::Result<T, Error>;
