//! Retry, throttling, timeout and cancellation behavior of the invoker.
//!
//! Runs on paused tokio time, so backoff waits complete instantly while
//! `Instant` deltas still reflect the scheduled delays.

mod support;

use resilient_llm::transport::CallOutcome;
use resilient_llm::{
    AttemptFailure, Error, GenerationRequest, InvokerConfig, ResilientInvoker, ResultSource,
    UsageTracker,
};
use std::sync::Arc;
use std::time::Duration;
use support::{ok, ok_after, throttled, transient, ScriptedApi, Step};
use tokio_util::sync::CancellationToken;

fn invoker(api: Arc<ScriptedApi>, config: InvokerConfig) -> ResilientInvoker {
    ResilientInvoker::builder(api).config(config).build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let api = ScriptedApi::always(transient());
    let inv = invoker(api.clone(), InvokerConfig::default());

    let err = inv.generate(&GenerationRequest::new("hello")).await.unwrap_err();
    match err {
        Error::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(last, AttemptFailure::Transient { status: Some(503), .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(api.call_count(), 3);
    assert_eq!(inv.usage_snapshot().total_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let api = ScriptedApi::always(transient());
    let inv = invoker(api.clone(), InvokerConfig::default());

    let _ = inv.generate(&GenerationRequest::new("hello")).await;
    let t = api.call_times();
    assert_eq!(t.len(), 3);
    assert!(t[1] - t[0] >= Duration::from_secs(2));
    assert!(t[2] - t[1] >= Duration::from_secs(4));
    assert!(t[2] - t[1] > t[1] - t[0]);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_transient_failure() {
    let api = ScriptedApi::new(vec![transient()], ok("fine"));
    let inv = invoker(api.clone(), InvokerConfig::default());

    let res = inv.generate(&GenerationRequest::new("hello")).await.unwrap();
    assert_eq!(res.raw, "fine");
    assert_eq!(res.source, ResultSource::Api);
    assert_eq!(res.attempts, 2);
    assert_eq!(inv.usage_snapshot().total_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_is_not_retried() {
    let api = ScriptedApi::always(Step::Reply(CallOutcome::Fatal {
        status: Some(401),
        message: "Incorrect API key provided".into(),
    }));
    let inv = invoker(api.clone(), InvokerConfig::default());

    let err = inv.generate(&GenerationRequest::new("hello")).await.unwrap_err();
    assert!(matches!(err, Error::Fatal { .. }));
    assert_eq!(err.context().and_then(|c| c.status_code), Some(401));
    assert!(!err.is_retryable());
    assert_eq!(api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_never_reaches_api() {
    let api = ScriptedApi::always(ok("unused"));
    let inv = invoker(api.clone(), InvokerConfig::default());

    let err = inv.generate(&GenerationRequest::new("")).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_attempt() {
    let api = ScriptedApi::new(vec![Step::Hang], ok("late but fine"));
    let cfg = InvokerConfig::default().with_timeout(Duration::from_secs(1));
    let inv = invoker(api.clone(), cfg);

    let res = inv.generate(&GenerationRequest::new("hello")).await.unwrap();
    assert_eq!(res.attempts, 2);

    let t = api.call_times();
    // 1s deadline plus the first 2s backoff.
    assert!(t[1] - t[0] >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_every_attempt_timing_out_exhausts_retries() {
    let api = ScriptedApi::always(Step::Hang);
    let cfg = InvokerConfig::default()
        .with_timeout(Duration::from_secs(1))
        .with_max_retries(2);
    let inv = invoker(api.clone(), cfg);

    let err = inv.generate(&GenerationRequest::new("hello")).await.unwrap_err();
    match err {
        Error::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 2);
            assert_eq!(
                last,
                AttemptFailure::Timeout {
                    after: Duration::from_secs(1)
                }
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_throttle_delays_next_attempt_by_retry_after() {
    let api = ScriptedApi::new(vec![throttled(5)], ok("done"));
    let inv = invoker(api.clone(), InvokerConfig::default());

    let res = inv.generate(&GenerationRequest::new("hello")).await.unwrap();
    assert_eq!(res.attempts, 2);
    let t = api.call_times();
    assert!(t[1] - t[0] >= Duration::from_secs(5));
    assert!(!inv.usage_snapshot().is_rate_limited);
}

#[tokio::test(start_paused = true)]
async fn test_absurd_retry_after_is_clamped_not_fatal() {
    let api = ScriptedApi::new(
        vec![Step::Reply(CallOutcome::throttled(Some(Duration::MAX)))],
        ok("done"),
    );
    let inv = invoker(api.clone(), InvokerConfig::default());

    let res = inv.generate(&GenerationRequest::new("hello")).await.unwrap();
    assert_eq!(res.attempts, 2);
    let t = api.call_times();
    let waited = t[1] - t[0];
    assert!(waited >= resilient_llm::usage::MAX_THROTTLE_WAIT);
    assert!(waited < resilient_llm::usage::MAX_THROTTLE_WAIT + Duration::from_secs(1));
    assert!(!inv.usage_snapshot().is_rate_limited);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_is_honored_by_concurrent_callers() {
    let usage = Arc::new(UsageTracker::new());
    let api_a = ScriptedApi::new(vec![throttled(5)], ok("a"));
    let api_b = ScriptedApi::always(ok("b"));
    let inv_a = Arc::new(
        ResilientInvoker::builder(api_a.clone())
            .usage(usage.clone())
            .build()
            .unwrap(),
    );
    let inv_b = ResilientInvoker::builder(api_b.clone())
        .usage(usage.clone())
        .build()
        .unwrap();

    let task = {
        let inv_a = inv_a.clone();
        tokio::spawn(async move { inv_a.generate(&GenerationRequest::new("first")).await })
    };
    api_a.wait_for_calls(1).await;
    let throttled_at = api_a.call_times()[0];

    let snap = inv_b.usage_snapshot();
    assert!(snap.is_rate_limited);
    assert_eq!(snap.resets_in_seconds, 5);

    inv_b.generate(&GenerationRequest::new("second")).await.unwrap();
    assert!(api_b.call_times()[0] - throttled_at >= Duration::from_secs(5));

    task.await.unwrap().unwrap();
    assert_eq!(usage.snapshot().total_calls, 2);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_without_hint_falls_back_to_backoff() {
    let api = ScriptedApi::new(
        vec![Step::Reply(CallOutcome::throttled(None))],
        ok("done"),
    );
    let inv = invoker(api.clone(), InvokerConfig::default());

    let task = {
        let usage = inv.usage();
        let api = api.clone();
        tokio::spawn(async move {
            api.wait_for_calls(1).await;
            usage.snapshot().is_rate_limited
        })
    };
    let res = inv.generate(&GenerationRequest::new("hello")).await.unwrap();
    assert!(!task.await.unwrap());
    assert_eq!(res.attempts, 2);
    let t = api.call_times();
    assert!(t[1] - t[0] >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_call_leaves_no_trace() {
    let api = ScriptedApi::always(ok_after(Duration::from_secs(10), "slow"));
    let inv = Arc::new(invoker(api.clone(), InvokerConfig::default()));
    let token = CancellationToken::new();

    let task = {
        let inv = inv.clone();
        let token = token.clone();
        tokio::spawn(async move {
            inv.generate_with_cancel(&GenerationRequest::new("hello"), token)
                .await
        })
    };
    api.wait_for_calls(1).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();

    assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
    assert_eq!(inv.usage_snapshot().total_calls, 0);
    assert_eq!(inv.cache_stats().sets, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_rate_limit() {
    let api = ScriptedApi::always(ok("never"));
    let inv = invoker(api.clone(), InvokerConfig::default());
    inv.usage().note_throttled(Duration::from_secs(60));

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        })
    };
    let res = inv
        .generate_with_cancel(&GenerationRequest::new("hello"), token)
        .await;
    canceller.await.unwrap();

    assert!(matches!(res, Err(Error::Cancelled)));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reload_config_clears_rate_limit() {
    let api = ScriptedApi::always(ok("done"));
    let inv = invoker(api.clone(), InvokerConfig::default());
    inv.usage().note_throttled(Duration::from_secs(60));
    assert!(inv.usage_snapshot().is_rate_limited);

    inv.reload_config(InvokerConfig::default().with_max_retries(5))
        .unwrap();
    assert!(!inv.usage_snapshot().is_rate_limited);
    assert_eq!(inv.config().max_retries, 5);

    let started = tokio::time::Instant::now();
    inv.generate(&GenerationRequest::new("hello")).await.unwrap();
    assert_eq!(api.call_times()[0], started);
}

#[tokio::test(start_paused = true)]
async fn test_reload_rejects_invalid_config() {
    let api = ScriptedApi::always(ok("done"));
    let inv = invoker(api, InvokerConfig::default());

    let err = inv
        .reload_config(InvokerConfig::default().with_max_retries(0))
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(inv.config().max_retries, 3);
}

#[tokio::test(start_paused = true)]
async fn test_usage_accounting() {
    let api = ScriptedApi::always(ok("counted"));
    let inv = invoker(api, InvokerConfig::default());

    let res = inv.generate(&GenerationRequest::new("hello")).await.unwrap();
    assert_eq!(res.usage.total(), 15);

    let snap = inv.usage_snapshot();
    assert_eq!(snap.total_calls, 1);
    assert_eq!(snap.prompt_tokens, 10);
    assert_eq!(snap.completion_tokens, 5);
    assert_eq!(snap.total_tokens, 15);
    assert!(!snap.is_rate_limited);
    assert_eq!(snap.resets_in_seconds, 0);

    // A cache hit is free.
    let hit = inv.generate(&GenerationRequest::new("hello")).await.unwrap();
    assert_eq!(hit.source, ResultSource::Cache);
    assert_eq!(hit.usage.total(), 0);
    assert_eq!(inv.usage_snapshot(), snap);
}

#[tokio::test(start_paused = true)]
async fn test_request_parameters_reach_the_api() {
    let api = ScriptedApi::always(ok("{}"));
    let inv = invoker(api.clone(), InvokerConfig::default());

    let req = GenerationRequest::new("describe")
        .with_model("gpt-4o")
        .with_temperature(0.7)
        .with_max_tokens(64)
        .structured(true);
    inv.generate(&req).await.unwrap();

    let call = &api.calls()[0];
    assert_eq!(call.model, "gpt-4o");
    assert_eq!(call.temperature, 0.7);
    assert_eq!(call.max_tokens, 64);
    assert_eq!(call.timeout, Duration::from_secs(30));
    assert!(call.json_mode.to_openai_format().is_some());
}
