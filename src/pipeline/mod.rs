//! 编排流水线：可取消的“分析 → 生成”两阶段工作流与进度事件。
//!
//! # Edit Pipeline Layer
//!
//! This module composes the resilience primitives and a [`RemoteAiClient`] into the two-stage
//! workflow every request goes through.
//!
//! ## Request Lifecycle
//!
//! ```text
//! Queued → (RateLimited) → Analyzing → (Retrying)* → AnalysisComplete
//!        → (RateLimited) → Generating → (Retrying)* → GenerationComplete
//!
//! any state ──► Failed(kind) | Cancelled
//! ```
//!
//! Each stage holds one rate-limiter slot for its whole duration, backoff waits included, and
//! consults the circuit breaker on every attempt. Exactly one [`PipelineResult`] is produced per
//! request, and the progress stream closes after the terminal event.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Orchestrator`] | Runs requests inline, on spawned tasks, or in ordered batches |
//! | [`PipelineRun`] | Handle to a spawned request: events, cancel, result |
//! | [`ProgressSender`] / [`ProgressStream`] | Per-request progress channel |
//! | [`PipelineRequest`] / [`PipelineResult`] | Immutable input and terminal output |
//!
//! [`RemoteAiClient`]: crate::client::RemoteAiClient

pub mod orchestrator;
pub mod progress;
pub mod types;

pub use orchestrator::{CancelHandle, Orchestrator, PipelineRun};
pub use progress::{ProgressSender, ProgressStream};
pub use types::{FailureKind, PipelineRequest, PipelineResult, ProgressEvent};
