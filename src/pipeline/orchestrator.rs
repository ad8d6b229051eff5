use crate::client::validation;
use crate::client::RemoteAiClient;
use crate::config::PipelineConfig;
use crate::context::CallContext;
use crate::pipeline::progress::{ProgressSender, ProgressStream};
use crate::pipeline::types::{FailureKind, PipelineRequest, PipelineResult, ProgressEvent};
use crate::resilience::circuit_breaker::Outcome;
use crate::resilience::retry::RetryPolicy;
use crate::resilience::{Operation, ResilienceRegistry};
use crate::sink::{noop_sink, ResultSink};
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs the analyze → generate workflow for each request.
///
/// Cheap to clone; clones share the client, the resilience registry and the result sink.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn RemoteAiClient>,
    registry: Arc<ResilienceRegistry>,
    retry: RetryPolicy,
    config: Arc<PipelineConfig>,
    sink: Arc<dyn ResultSink>,
}

impl Orchestrator {
    /// Build an orchestrator with its own registry derived from `config`.
    pub fn new(client: Arc<dyn RemoteAiClient>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            registry: Arc::new(ResilienceRegistry::from_config(&config)),
            retry: RetryPolicy::new(config.retry_config()),
            config: Arc::new(config),
            sink: noop_sink(),
        })
    }

    /// Share limiter and breaker state with other orchestrators.
    pub fn with_registry(mut self, registry: Arc<ResilienceRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Inject the persistence collaborator. Default is a no-op sink.
    pub fn with_result_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<ResilienceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start `request` on its own task.
    ///
    /// Cancelling the returned run (or `ctx`) stops the pipeline at its next suspension point.
    pub fn run(&self, ctx: &CallContext, request: PipelineRequest) -> PipelineRun {
        let ctx = ctx.child();
        let request_id = request.id;
        let (progress, events) = ProgressSender::channel(request_id);
        let cancel = CancelHandle {
            token: ctx.token().clone(),
        };

        let this = self.clone();
        let handle =
            tokio::spawn(async move { this.execute(&ctx, request, &progress).await });

        PipelineRun {
            request_id,
            events: Some(events),
            cancel,
            handle,
        }
    }

    /// Run many requests with at most `concurrency` in flight; results keep input order.
    pub async fn run_batch(
        &self,
        ctx: &CallContext,
        requests: Vec<PipelineRequest>,
        concurrency: usize,
    ) -> Vec<PipelineResult> {
        futures::stream::iter(requests)
            .map(|request| async move {
                let progress = ProgressSender::detached(request.id);
                self.execute(ctx, request, &progress).await
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Run `request` on the current task, reporting through `progress`.
    pub async fn execute(
        &self,
        ctx: &CallContext,
        request: PipelineRequest,
        progress: &ProgressSender,
    ) -> PipelineResult {
        let started = Instant::now();
        let ctx = match request.deadline {
            Some(deadline) => ctx.clone().with_deadline(deadline),
            None => ctx.clone(),
        };

        progress.emit(ProgressEvent::Queued);
        info!(request_id = %request.id, "pipeline queued");

        let mut attempts = 0u32;
        let result = match self.stages(&ctx, &request, progress, &mut attempts).await {
            Ok((analysis_text, generated_image)) => {
                let elapsed = started.elapsed();
                progress.emit(ProgressEvent::GenerationComplete);
                info!(
                    request_id = %request.id,
                    attempts,
                    duration_ms = elapsed.as_millis() as u64,
                    "pipeline completed"
                );
                PipelineResult::Success {
                    request_id: request.id,
                    analysis_text,
                    generated_image,
                    elapsed,
                    attempts,
                }
            }
            Err(err) => {
                let kind = FailureKind::from(&err);
                let message = err.to_string();
                if kind == FailureKind::Cancelled {
                    progress.emit(ProgressEvent::Cancelled);
                    info!(request_id = %request.id, attempts, "pipeline cancelled");
                } else {
                    progress.emit(ProgressEvent::Failed {
                        kind,
                        message: message.clone(),
                    });
                    warn!(
                        request_id = %request.id,
                        kind = kind.as_str(),
                        attempts,
                        error = %message,
                        "pipeline failed"
                    );
                }
                PipelineResult::Failure {
                    request_id: request.id,
                    kind,
                    message,
                    attempts,
                }
            }
        };

        if let Err(e) = self.sink.record(&result).await {
            warn!(request_id = %request.id, error = %e, "result sink rejected result");
        }
        result
    }

    async fn stages(
        &self,
        ctx: &CallContext,
        request: &PipelineRequest,
        progress: &ProgressSender,
        attempts: &mut u32,
    ) -> Result<(String, Bytes)> {
        let limit = self.config.max_payload_bytes;

        // Pre-flight: nothing below this point runs for input that can never succeed.
        validation::validate_analyze(&request.image, limit)?;
        if let Some(mask) = &request.mask {
            validation::validate_payload(Operation::Generate, "mask", mask, limit)?;
        }
        if let Some(prompt) = &request.prompt {
            validation::validate_generate(&request.image, request.mask.as_deref(), prompt, limit)?;
        }

        let client = &self.client;
        let image = &request.image;
        let analysis = self
            .stage(ctx, Operation::Analyze, progress, attempts, |timeout| {
                client.analyze(image, timeout)
            })
            .await?;
        progress.emit(ProgressEvent::AnalysisComplete);

        let prompt = validation::validate_generate(
            image,
            request.mask.as_deref(),
            request.prompt.as_deref().unwrap_or(&analysis),
            limit,
        )?;
        let mask = request.mask.as_ref();
        let generated = self
            .stage(ctx, Operation::Generate, progress, attempts, |timeout| {
                client.generate(image, mask, prompt, timeout)
            })
            .await?;

        Ok((analysis, generated))
    }

    /// One stage: slot → retry loop of breaker-guarded, time-boxed attempts → slot released.
    async fn stage<T, F, Fut>(
        &self,
        ctx: &CallContext,
        op: Operation,
        progress: &ProgressSender,
        attempts: &mut u32,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let request_id = progress.request_id();
        let limiter = self.registry.limiter(op);
        let slot = limiter
            .acquire_observed(ctx, |wait| {
                info!(
                    request_id = %request_id,
                    operation = op.as_str(),
                    delay_ms = wait.as_millis() as u64,
                    "waiting for rate limiter"
                );
                progress.emit(ProgressEvent::RateLimited {
                    operation: op,
                    wait,
                });
            })
            .await?;

        progress.emit(match op {
            Operation::Analyze => ProgressEvent::Analyzing,
            Operation::Generate => ProgressEvent::Generating,
        });

        let started = Instant::now();
        let breaker = self.registry.breaker();
        let breaker = breaker.as_ref();
        let stage_timeout = match op {
            Operation::Analyze => self.config.analyze_timeout(),
            Operation::Generate => self.config.generate_timeout(),
        };

        let outcome = self
            .retry
            .execute(
                ctx,
                |attempt| progress.emit(ProgressEvent::Retrying { operation: op, attempt }),
                move |attempt| {
                    let per_attempt = ctx.clamp(stage_timeout);
                    let admitted = breaker
                        .guard(op)
                        .map(|guard| (guard, call(per_attempt)));
                    async move {
                        let (guard, fut) = admitted?;
                        debug!(
                            request_id = %request_id,
                            operation = op.as_str(),
                            attempt,
                            trial = guard.is_trial(),
                            timeout_ms = per_attempt.as_millis() as u64,
                            "calling remote service"
                        );
                        let result = match ctx.run(tokio::time::timeout(per_attempt, fut)).await {
                            Ok(Ok(result)) => result,
                            Ok(Err(_elapsed)) => Err(Error::timeout(
                                per_attempt,
                                ErrorContext::new()
                                    .with_operation(op.as_str())
                                    .with_source("orchestrator"),
                            )),
                            Err(abort) => Err(abort),
                        };
                        // an attempt cut short by the caller's deadline says nothing about the service
                        let result = match result {
                            Err(Error::Timeout { .. }) if per_attempt < stage_timeout => {
                                Err(Error::DeadlineExceeded)
                            }
                            other => other,
                        };
                        guard.finish(Outcome::of(&result));
                        result
                    }
                },
            )
            .await;

        limiter.release(slot);

        match outcome {
            Ok(done) => {
                *attempts = (*attempts).max(done.attempts);
                info!(
                    request_id = %request_id,
                    operation = op.as_str(),
                    attempt = done.attempts,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "stage complete"
                );
                Ok(done.value)
            }
            Err(failure) => {
                // a breaker rejection never reached the service
                let made = match failure.error {
                    Error::CircuitOpen { .. } => failure.attempts.saturating_sub(1),
                    _ => failure.attempts,
                };
                *attempts = (*attempts).max(made);
                Err(failure.error)
            }
        }
    }
}

/// Cancels one pipeline run.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Handle to a pipeline started with [`Orchestrator::run`].
pub struct PipelineRun {
    request_id: Uuid,
    events: Option<ProgressStream>,
    cancel: CancelHandle,
    handle: JoinHandle<PipelineResult>,
}

impl PipelineRun {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The progress stream. Single subscriber: later calls return `None`.
    pub fn events(&mut self) -> Option<ProgressStream> {
        self.events.take()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal result.
    pub async fn result(self) -> PipelineResult {
        let request_id = self.request_id;
        match self.handle.await {
            Ok(result) => result,
            Err(e) => PipelineResult::Failure {
                request_id,
                kind: FailureKind::Internal,
                message: format!("pipeline task failed: {}", e),
                attempts: 0,
            },
        }
    }
}
