//! Integration tests for priority failover across scripted providers

mod common;

use common::{dispatch_config, dispatcher, dispatcher_with_policy, ScriptedProvider, Step};
use search_fusion::search::{
    AttemptOutcome, CooldownPolicy, DispatchError, FailureReason, ProviderPreference,
    SearchRequest,
};
use std::time::Duration;

fn counts(d: &search_fusion::search::Dispatcher, name: &str) -> (u64, u64) {
    let health = d.registry().stats().snapshot(name).expect("known provider");
    (health.success_count, health.error_count)
}

#[tokio::test]
async fn test_skips_cooling_provider_and_fails_over() {
    let a = ScriptedProvider::new("a", 1).into_arc();
    let b = ScriptedProvider::new("b", 2).always(Step::Network).into_arc();
    let c = ScriptedProvider::new("c", 3).into_arc();
    let d = dispatcher(&[a.clone(), b.clone(), c.clone()], 4, dispatch_config(60, 30, 10));

    d.registry().stats().record_error("a", true);
    let a_before = counts(&d, "a");

    let result = d.search("rust", 5, "auto").await.expect("c should answer");

    assert_eq!(result.provider, "c");
    assert_eq!(result.outcome, AttemptOutcome::Success);
    assert_eq!(result.items.len(), 3);
    assert_eq!(a.calls(), 0, "cooling provider must not be called");
    assert_eq!(b.calls(), 1);
    assert_eq!(counts(&d, "a"), a_before);
    assert_eq!(counts(&d, "b"), (0, 1));
    assert_eq!(counts(&d, "c"), (1, 0));
}

#[tokio::test]
async fn test_explicit_preference_has_no_fallback() {
    let a = ScriptedProvider::new("a", 1).always(Step::Network).into_arc();
    let b = ScriptedProvider::new("b", 2).into_arc();
    let c = ScriptedProvider::new("c", 3).into_arc();
    let d = dispatcher(&[a.clone(), b.clone(), c.clone()], 4, dispatch_config(60, 30, 10));

    d.registry().stats().record_error("a", true);

    let err = d.search("rust", 5, "A").await.expect_err("a fails");

    match &err {
        DispatchError::Exhausted { attempts } => {
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].provider, "a");
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(a.calls(), 1, "explicit provider is tried even while cooling");
    assert_eq!(b.calls() + c.calls(), 0);
}

#[tokio::test]
async fn test_unknown_explicit_provider() {
    let a = ScriptedProvider::new("a", 1).into_arc();
    let d = dispatcher(&[a], 1, dispatch_config(60, 30, 10));

    let err = d.search("rust", 5, "nope").await.expect_err("unknown");
    assert!(matches!(err, DispatchError::UnknownProvider(ref n) if n == "nope"));
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let a = ScriptedProvider::new("a", 1).into_arc();
    let d = dispatcher(&[a.clone()], 1, dispatch_config(60, 30, 10));

    let err = d.search("   ", 5, "auto").await.expect_err("empty query");
    assert!(matches!(err, DispatchError::EmptyQuery));
    assert_eq!(a.calls(), 0);
    assert_eq!(d.stats().total_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_global_budget_stops_third_attempt() {
    let a = ScriptedProvider::new("a", 1)
        .with_delay(Duration::from_secs(25))
        .always(Step::Network)
        .into_arc();
    let b = ScriptedProvider::new("b", 2)
        .with_delay(Duration::from_secs(25))
        .always(Step::Network)
        .into_arc();
    let c = ScriptedProvider::new("c", 3)
        .with_delay(Duration::from_secs(25))
        .into_arc();
    let d = dispatcher(&[a.clone(), b.clone(), c.clone()], 4, dispatch_config(60, 30, 10));

    let started = tokio::time::Instant::now();
    let err = d.search("rust", 5, "auto").await.expect_err("budget runs out");

    match &err {
        DispatchError::GlobalTimeoutExceeded { budget, attempts } => {
            assert_eq!(*budget, Duration::from_secs(60));
            let order: Vec<_> = attempts.iter().map(|a| a.provider.as_str()).collect();
            assert_eq!(order, ["a", "b", "c"]);
            assert_eq!(attempts[2].reason, FailureReason::GlobalTimeout);
        }
        other => panic!("expected GlobalTimeoutExceeded, got {other:?}"),
    }
    assert_eq!(started.elapsed(), Duration::from_secs(60));
    assert_eq!(counts(&d, "a"), (0, 1));
    assert_eq!(counts(&d, "b"), (0, 1));
    assert_eq!(counts(&d, "c"), (0, 0), "abandoned attempt is not counted");
    assert_eq!(d.gate().in_flight(), 0, "permit released after cut-off");
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_fails_over() {
    let a = ScriptedProvider::new("a", 1).always(Step::Hang).into_arc();
    let b = ScriptedProvider::new("b", 2).into_arc();
    let d = dispatcher(&[a.clone(), b.clone()], 4, dispatch_config(60, 5, 10));

    let result = d.search("rust", 2, "auto").await.expect("b answers");

    assert_eq!(result.provider, "b");
    assert_eq!(result.items.len(), 2);
    assert_eq!(counts(&d, "a"), (0, 1));
    assert_eq!(d.gate().in_flight(), 0);
}

#[tokio::test]
async fn test_rate_limit_starts_cooldown() {
    let a = ScriptedProvider::new("a", 1)
        .with_script(vec![Step::RateLimit])
        .into_arc();
    let b = ScriptedProvider::new("b", 2).into_arc();
    let d = dispatcher(&[a.clone(), b.clone()], 4, dispatch_config(60, 30, 10));

    let first = d.search("rust", 3, "auto").await.expect("b answers");
    assert_eq!(first.provider, "b");
    assert!(d.registry().stats().is_cooling_down("a"));

    let second = d.search("rust", 3, "auto").await.expect("b answers again");
    assert_eq!(second.provider, "b");
    assert_eq!(a.calls(), 1, "cooling provider skipped on the next request");
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_length_is_per_provider() {
    let a = ScriptedProvider::new("a", 1)
        .with_cooldown(Duration::from_secs(300))
        .with_script(vec![Step::RateLimit])
        .into_arc();
    let b = ScriptedProvider::new("b", 2)
        .with_script(vec![Step::RateLimit])
        .into_arc();
    let c = ScriptedProvider::new("c", 3).into_arc();
    let d = dispatcher(&[a.clone(), b.clone(), c.clone()], 4, dispatch_config(60, 30, 10));

    let first = d.search("rust", 3, "auto").await.expect("c answers");
    assert_eq!(first.provider, "c");

    let statuses = d.engine_statuses();
    assert_eq!(statuses[0].cooldown_secs, 300);
    assert_eq!(statuses[1].cooldown_secs, 60);

    tokio::time::advance(Duration::from_secs(60)).await;
    let second = d.search("rust", 3, "auto").await.expect("b is back");
    assert_eq!(second.provider, "b");
    assert!(d.registry().stats().is_cooling_down("a"));

    tokio::time::advance(Duration::from_secs(240)).await;
    let third = d.search("rust", 3, "auto").await.expect("a is back");
    assert_eq!(third.provider, "a");
    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn test_auth_rejection_excludes_provider() {
    let a = ScriptedProvider::new("a", 1).always(Step::Auth).into_arc();
    let b = ScriptedProvider::new("b", 2).into_arc();
    let d = dispatcher(&[a.clone(), b.clone()], 4, dispatch_config(60, 30, 10));

    d.search("rust", 3, "auto").await.expect("b answers");
    d.search("rust", 3, "auto").await.expect("b answers");

    assert_eq!(a.calls(), 1);
    let health = d.registry().stats().snapshot("a").expect("known");
    assert!(health.credential_rejected);
    assert!(!health.is_cooling_down(tokio::time::Instant::now()));

    let statuses = d.engine_statuses();
    let a_status = statuses.iter().find(|s| s.name == "a").expect("a listed");
    assert!(!a_status.available);
    assert!(a_status.credential_rejected);
}

#[tokio::test]
async fn test_empty_results_count_as_failure() {
    let a = ScriptedProvider::new("a", 1).always(Step::Empty).into_arc();
    let b = ScriptedProvider::new("b", 2).into_arc();
    let d = dispatcher(&[a.clone(), b.clone()], 4, dispatch_config(60, 30, 10));

    let result = d.search("rust", 3, "auto").await.expect("b answers");
    assert_eq!(result.provider, "b");
    assert_eq!(counts(&d, "a"), (0, 1));
    assert!(!d.registry().stats().is_cooling_down("a"));
}

#[tokio::test]
async fn test_missing_credential_is_skipped_in_auto_mode() {
    let a = ScriptedProvider::new("a", 1).without_credential().into_arc();
    let b = ScriptedProvider::new("b", 2).into_arc();
    let d = dispatcher(&[a.clone(), b.clone()], 4, dispatch_config(60, 30, 10));

    let result = d.search("rust", 3, "auto").await.expect("b answers");
    assert_eq!(result.provider, "b");
    assert_eq!(a.calls(), 0);

    let err = d.search("rust", 3, "a").await.expect_err("no credential");
    let attempts = err.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].reason, FailureReason::CredentialMissing);
    assert_eq!(a.calls(), 0, "provider without credential is never called");
    assert_eq!(counts(&d, "a"), (0, 0));
}

#[tokio::test]
async fn test_all_failing_lists_every_attempt_in_order() {
    let a = ScriptedProvider::new("a", 2).always(Step::Network).into_arc();
    let b = ScriptedProvider::new("b", 1).always(Step::RateLimit).into_arc();
    let d = dispatcher(&[a.clone(), b.clone()], 4, dispatch_config(60, 30, 10));

    let err = d.search("rust", 3, "auto").await.expect_err("everything fails");

    let attempts = err.attempts();
    assert_eq!(attempts[0].provider, "b");
    assert_eq!(attempts[0].reason, FailureReason::RateLimited);
    assert_eq!(attempts[1].provider, "a");
    assert!(matches!(attempts[1].reason, FailureReason::Provider(_)));
    assert!(err.to_string().contains("b (rate limited)"));

    // both out of the way now: b cooling, a still eligible
    let err = d.search("rust", 3, "auto").await.expect_err("a fails again");
    assert_eq!(err.attempts().len(), 1);
}

#[tokio::test]
async fn test_no_eligible_providers() {
    let a = ScriptedProvider::new("a", 1).without_credential().into_arc();
    let d = dispatcher(&[a], 1, dispatch_config(60, 30, 10));

    let err = d.search("rust", 3, "auto").await.expect_err("nothing eligible");
    assert!(matches!(err, DispatchError::NoEligibleProviders));
}

#[tokio::test]
async fn test_consecutive_error_threshold() {
    let a = ScriptedProvider::new("a", 1).always(Step::Network).into_arc();
    let b = ScriptedProvider::new("b", 2).into_arc();
    let policy = CooldownPolicy {
        backoff: Duration::from_secs(60),
        error_threshold: Some(2),
    };
    let d = dispatcher_with_policy(&[a.clone(), b.clone()], 4, dispatch_config(60, 30, 10), policy);

    d.search("rust", 3, "auto").await.expect("b answers");
    assert!(!d.registry().stats().is_cooling_down("a"));
    d.search("rust", 3, "auto").await.expect("b answers");
    assert!(d.registry().stats().is_cooling_down("a"));
    d.search("rust", 3, "auto").await.expect("b answers");

    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn test_results_truncated_to_count() {
    let a = ScriptedProvider::new("a", 1).always(Step::Results(10)).into_arc();
    let d = dispatcher(&[a], 1, dispatch_config(60, 30, 10));

    let result = d
        .dispatch(SearchRequest::new("rust", 4).with_preference(ProviderPreference::Auto))
        .await
        .expect("a answers");
    assert_eq!(result.items.len(), 4);
}

#[tokio::test]
async fn test_dispatch_statistics() {
    let a = ScriptedProvider::new("a", 1)
        .with_script(vec![Step::Network])
        .into_arc();
    let d = dispatcher(&[a], 1, dispatch_config(60, 30, 10));

    assert!(d.search("rust", 3, "auto").await.is_err());
    d.search("rust", 3, "auto").await.expect("a recovers");

    let stats = d.stats();
    assert_eq!(stats.total_engines, 1);
    assert_eq!(stats.available_engines, 1);
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.successful_requests, 1);
    assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(stats.last_used_engine.as_deref(), Some("a"));
    assert!(stats.last_dispatch_at.is_some());
}

#[tokio::test]
async fn test_shutdown_refuses_new_requests() {
    let a = ScriptedProvider::new("a", 1).into_arc();
    let d = dispatcher(&[a.clone()], 1, dispatch_config(60, 30, 10));

    d.shutdown();
    let err = d.search("rust", 3, "auto").await.expect_err("shut down");
    assert!(matches!(err, DispatchError::ShutDown));
    assert_eq!(a.calls(), 0);
}
