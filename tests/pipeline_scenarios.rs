//! End-to-end pipeline behavior against a scripted remote client

mod common;

use ai_edit_pipeline::pipeline::{
    FailureKind, Orchestrator, PipelineRequest, PipelineResult, PipelineRun, ProgressEvent,
};
use ai_edit_pipeline::resilience::circuit_breaker::{BreakerState, Outcome};
use ai_edit_pipeline::resilience::Operation;
use ai_edit_pipeline::{CallContext, Error, ErrorContext, InMemoryResultSink, PipelineConfig};
use bytes::Bytes;
use common::{jpeg, transient, ScriptedClient};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MB: usize = 1024 * 1024;

fn orchestrator(client: &Arc<ScriptedClient>, config: PipelineConfig) -> Orchestrator {
    Orchestrator::new(client.clone(), config).expect("valid config")
}

async fn drain(run: &mut PipelineRun) -> Vec<ProgressEvent> {
    run.events().expect("events taken once").collect().await
}

fn names(events: &[ProgressEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_success() {
    let client = Arc::new(ScriptedClient::new());
    let orch = orchestrator(&client, PipelineConfig::default());

    let mut run = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(5 * MB)));
    let events = drain(&mut run).await;

    assert_eq!(
        names(&events),
        vec![
            "queued",
            "analyzing",
            "analysis_complete",
            "generating",
            "generation_complete"
        ]
    );
    match run.result().await {
        PipelineResult::Success {
            analysis_text,
            generated_image,
            attempts,
            ..
        } => {
            assert_eq!(analysis_text, "a red car on a street");
            assert_eq!(generated_image, Bytes::from_static(b"edited-image-bytes"));
            assert_eq!(attempts, 1);
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(
        *client.prompts.lock().unwrap(),
        vec!["a red car on a street".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_oversized_payload_rejected_without_remote_calls() {
    let client = Arc::new(ScriptedClient::new());
    let orch = orchestrator(&client, PipelineConfig::default());

    let mut run = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(25 * MB)));
    let events = drain(&mut run).await;
    let result = run.result().await;

    assert_eq!(names(&events), vec!["queued", "failed"]);
    assert_eq!(result.failure_kind(), Some(FailureKind::PayloadTooLarge));
    assert_eq!(result.attempts(), 0);
    assert_eq!(client.analyze_count(), 0);
    assert_eq!(client.generate_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_analysis_releases_slot() {
    let client = Arc::new(ScriptedClient::new().analyze_delay(Duration::from_secs(20)));
    let orch = orchestrator(&client, PipelineConfig::default());

    let mut run = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(1024)));
    let mut events = run.events().unwrap();
    let mut seen = Vec::new();
    while let Some(event) = events.next().await {
        if event == ProgressEvent::Analyzing {
            run.cancel();
        }
        seen.push(event);
    }
    let result = run.result().await;

    assert_eq!(names(&seen), vec!["queued", "analyzing", "cancelled"]);
    assert_eq!(result.failure_kind(), Some(FailureKind::Cancelled));
    assert_eq!(
        orch.registry().limiter(Operation::Analyze).available_slots(),
        3
    );
    assert_eq!(client.generate_count(), 0);
    // caller cancellation is not held against the service
    let snapshot = orch.registry().breaker().snapshot(Operation::Analyze);
    assert_eq!(snapshot.samples, 0);
    assert_eq!(snapshot.state, BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_slot() {
    let client = Arc::new(ScriptedClient::new().analyze_delay(Duration::from_secs(30)));
    let orch = orchestrator(&client, PipelineConfig::default().with_max_concurrent(1));

    let busy = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(1024)));
    tokio::task::yield_now().await;

    let waiting_ctx = CallContext::new();
    let mut waiting = orch.run(&waiting_ctx, PipelineRequest::new(jpeg(1024)));
    let mut events = waiting.events().unwrap();
    let mut seen = Vec::new();
    while let Some(event) = events.next().await {
        if matches!(event, ProgressEvent::RateLimited { .. }) {
            waiting_ctx.cancel();
        }
        seen.push(event);
    }

    assert_eq!(names(&seen), vec!["queued", "rate_limited", "cancelled"]);
    assert_eq!(
        waiting.result().await.failure_kind(),
        Some(FailureKind::Cancelled)
    );
    assert!(busy.result().await.is_success());
    assert_eq!(
        orch.registry().limiter(Operation::Analyze).available_slots(),
        1
    );
    assert_eq!(client.analyze_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retried_with_backoff() {
    let client = Arc::new(ScriptedClient::new().analyze_with(|n| {
        if n <= 2 {
            Err(transient())
        } else {
            Ok("a red car on a street".into())
        }
    }));
    let orch = orchestrator(&client, PipelineConfig::default());

    let started = Instant::now();
    let mut run = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(1024)));
    let events = drain(&mut run).await;
    let result = run.result().await;

    assert!(result.is_success());
    assert_eq!(result.attempts(), 3);
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert_eq!(client.analyze_count(), 3);
    assert_eq!(
        names(&events),
        vec![
            "queued",
            "analyzing",
            "retrying",
            "retrying",
            "analysis_complete",
            "generating",
            "generation_complete"
        ]
    );
    assert_eq!(
        events[2],
        ProgressEvent::Retrying {
            operation: Operation::Analyze,
            attempt: 2
        }
    );
    assert_eq!(
        events[3],
        ProgressEvent::Retrying {
            operation: Operation::Analyze,
            attempt: 3
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_exhaust_attempts() {
    let client = Arc::new(ScriptedClient::new().analyze_delay(Duration::from_secs(10)));
    let config = PipelineConfig::default()
        .with_timeouts(Duration::from_secs(1), Duration::from_secs(1));
    let orch = orchestrator(&client, config);

    let mut run = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(1024)));
    let events = drain(&mut run).await;
    let result = run.result().await;

    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    assert_eq!(result.attempts(), 3);
    assert_eq!(client.analyze_count(), 3);
    assert_eq!(client.analyze_gauge.current(), 0);
    assert_eq!(events.last().map(|e| e.name()), Some("failed"));
    assert_eq!(
        orch.registry().breaker().snapshot(Operation::Analyze).failures,
        3
    );
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_not_retried() {
    let client = Arc::new(ScriptedClient::new().generate_with(|_| {
        Err(Error::auth_with_context(
            "token rejected",
            ErrorContext::new().with_status_code(401),
        ))
    }));
    let orch = orchestrator(&client, PipelineConfig::default());

    let mut run = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(1024)));
    let events = drain(&mut run).await;
    let result = run.result().await;

    assert_eq!(result.failure_kind(), Some(FailureKind::Auth));
    assert_eq!(client.generate_count(), 1);
    assert_eq!(
        names(&events),
        vec!["queued", "analyzing", "analysis_complete", "generating", "failed"]
    );
    assert_eq!(
        orch.registry().breaker().snapshot(Operation::Generate).samples,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_fails_fast_as_service_unavailable() {
    let client = Arc::new(ScriptedClient::new());
    let orch = orchestrator(&client, PipelineConfig::default());
    let breaker = orch.registry().breaker();
    for _ in 0..5 {
        let permit = breaker.allow(Operation::Generate).unwrap();
        breaker.record_outcome(permit, Outcome::Failure);
    }
    assert_eq!(breaker.state(Operation::Generate), BreakerState::Open);

    let mut run = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(1024)));
    let events = drain(&mut run).await;
    let result = run.result().await;

    assert_eq!(result.failure_kind(), Some(FailureKind::ServiceUnavailable));
    assert_eq!(client.analyze_count(), 1);
    assert_eq!(client.generate_count(), 0);
    assert_eq!(result.attempts(), 1);
    assert!(!names(&events).contains(&"retrying"));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_mid_retry_then_recovers() {
    let client = Arc::new(ScriptedClient::new().analyze_with(|n| {
        if n <= 5 {
            Err(transient())
        } else {
            Ok("a red car on a street".into())
        }
    }));
    let orch = orchestrator(&client, PipelineConfig::default());
    let ctx = CallContext::new();

    // three failures: below min_samples
    let first = orch.run(&ctx, PipelineRequest::new(jpeg(1024))).result().await;
    assert_eq!(first.failure_kind(), Some(FailureKind::TransientNetwork));
    assert_eq!(first.attempts(), 3);

    // fifth failure opens the breaker; the third attempt is rejected locally
    let second = orch.run(&ctx, PipelineRequest::new(jpeg(1024))).result().await;
    assert_eq!(second.failure_kind(), Some(FailureKind::ServiceUnavailable));
    assert_eq!(second.attempts(), 2);
    assert_eq!(client.analyze_count(), 5);

    let third = orch.run(&ctx, PipelineRequest::new(jpeg(1024))).result().await;
    assert_eq!(third.failure_kind(), Some(FailureKind::ServiceUnavailable));
    assert_eq!(client.analyze_count(), 5);

    tokio::time::advance(Duration::from_secs(16)).await;
    let fourth = orch.run(&ctx, PipelineRequest::new(jpeg(1024))).result().await;
    assert!(fourth.is_success());
    assert_eq!(
        orch.registry().breaker().state(Operation::Analyze),
        BreakerState::Closed
    );
}

#[tokio::test(start_paused = true)]
async fn test_overall_deadline_surfaces_as_timeout() {
    let client = Arc::new(ScriptedClient::new().analyze_delay(Duration::from_secs(30)));
    let orch = orchestrator(&client, PipelineConfig::default());

    let started = Instant::now();
    let request = PipelineRequest::new(jpeg(1024)).with_timeout(Duration::from_secs(2));
    let result = orch.run(&CallContext::new(), request).result().await;

    assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(
        orch.registry().limiter(Operation::Analyze).available_slots(),
        3
    );
    assert_eq!(client.generate_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_short_caller_deadlines_do_not_open_breaker() {
    let client = Arc::new(ScriptedClient::new().analyze_delay(Duration::from_secs(10)));
    let orch = orchestrator(&client, PipelineConfig::default());

    for _ in 0..5 {
        let request = PipelineRequest::new(jpeg(1024)).with_timeout(Duration::from_secs(2));
        let result = orch.run(&CallContext::new(), request).result().await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
    }

    let snapshot = orch.registry().breaker().snapshot(Operation::Analyze);
    assert_eq!(snapshot.state, BreakerState::Closed);
    assert_eq!(snapshot.failures, 0);

    // no deadline: the slow call completes and is not rejected by the breaker
    let result = orch
        .run(&CallContext::new(), PipelineRequest::new(jpeg(1024)))
        .result()
        .await;
    assert!(result.is_success());
    assert_eq!(client.analyze_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_prompt_override_used_for_generation() {
    let client = Arc::new(ScriptedClient::new());
    let orch = orchestrator(&client, PipelineConfig::default());

    let request = PipelineRequest::new(jpeg(1024))
        .with_mask(jpeg(256))
        .with_prompt("make the car blue");
    let result = orch.run(&CallContext::new(), request).result().await;

    assert!(result.is_success());
    assert_eq!(
        *client.prompts.lock().unwrap(),
        vec!["make the car blue".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_blank_analysis_fails_validation_before_generation() {
    let client = Arc::new(ScriptedClient::new().analyze_with(|_| Ok("   ".into())));
    let orch = orchestrator(&client, PipelineConfig::default());

    let result = orch
        .run(&CallContext::new(), PipelineRequest::new(jpeg(1024)))
        .result()
        .await;

    assert_eq!(result.failure_kind(), Some(FailureKind::Validation));
    assert_eq!(client.generate_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_window_wait_is_reported() {
    let client = Arc::new(ScriptedClient::new());
    let orch = orchestrator(
        &client,
        PipelineConfig::default().with_max_requests_per_minute(1),
    );

    let first = orch
        .run(&CallContext::new(), PipelineRequest::new(jpeg(1024)))
        .result()
        .await;
    assert!(first.is_success());

    let started = Instant::now();
    let mut run = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(1024)));
    let events = drain(&mut run).await;
    assert!(run.result().await.is_success());

    let waited = events.iter().find_map(|e| match e {
        ProgressEvent::RateLimited {
            operation: Operation::Analyze,
            wait,
        } => Some(*wait),
        _ => None,
    });
    let waited = waited.expect("analyze stage should report the window wait");
    assert!(waited > Duration::ZERO && waited <= Duration::from_secs(60));
    assert!(started.elapsed() >= waited);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_runs_respect_slot_pool() {
    let client = Arc::new(ScriptedClient::new().analyze_delay(Duration::from_secs(1)));
    let orch = orchestrator(&client, PipelineConfig::default());
    let ctx = CallContext::new();

    let runs: Vec<_> = (0..8)
        .map(|_| orch.run(&ctx, PipelineRequest::new(jpeg(1024))))
        .collect();
    for run in runs {
        assert!(run.result().await.is_success());
    }

    assert_eq!(client.analyze_count(), 8);
    assert!(client.analyze_gauge.peak() <= 3);
    assert_eq!(client.analyze_gauge.peak(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_batch_keeps_input_order() {
    let client = Arc::new(ScriptedClient::new().analyze_delay(Duration::from_millis(500)));
    let orch = orchestrator(&client, PipelineConfig::default());

    let requests: Vec<_> = (0..6)
        .map(|i| {
            let size = if i == 2 { 25 * MB } else { 1024 * (i + 1) };
            PipelineRequest::new(jpeg(size))
        })
        .collect();
    let ids: Vec<_> = requests.iter().map(|r| r.id).collect();

    let results = orch.run_batch(&CallContext::new(), requests, 2).await;

    assert_eq!(results.len(), 6);
    for (result, id) in results.iter().zip(&ids) {
        assert_eq!(result.request_id(), *id);
    }
    assert_eq!(
        results[2].failure_kind(),
        Some(FailureKind::PayloadTooLarge)
    );
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 5);
    assert!(client.analyze_gauge.peak() <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_result_sink_receives_terminal_result() {
    let client = Arc::new(ScriptedClient::new());
    let sink = Arc::new(InMemoryResultSink::new(16));
    let orch = orchestrator(&client, PipelineConfig::default()).with_result_sink(sink.clone());

    let ok = orch
        .run(&CallContext::new(), PipelineRequest::new(jpeg(1024)))
        .result()
        .await;
    let rejected = orch
        .run(&CallContext::new(), PipelineRequest::new(Vec::new()))
        .result()
        .await;

    assert_eq!(sink.len(), 2);
    assert!(sink.get(ok.request_id()).unwrap().is_success());
    assert_eq!(
        sink.get(rejected.request_id()).unwrap().failure_kind(),
        Some(FailureKind::Validation)
    );
}

#[tokio::test(start_paused = true)]
async fn test_events_can_only_be_taken_once() {
    let client = Arc::new(ScriptedClient::new());
    let orch = orchestrator(&client, PipelineConfig::default());

    let mut run = orch.run(&CallContext::new(), PipelineRequest::new(jpeg(1024)));
    assert!(run.events().is_some());
    assert!(run.events().is_none());
    assert!(run.result().await.is_success());
}
