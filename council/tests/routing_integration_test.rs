//! Integration tests for the Router
//!
//! Drives single and consensus execution through scripted backends on a
//! paused clock, so latencies and cooldowns are deterministic.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fail, fail_after, registry, reply, RecordingObserver, ScriptedInvoker};
use council_router::{
    Complexity, CostTier, HealthMonitor, ProviderCooldowns, RouteOptions, Router, RouterConfig,
    RouterError, TaskCategory,
};

fn tier0(ids: &[&'static str]) -> Vec<(&'static str, CostTier, f64)> {
    ids.iter().map(|id| (*id, CostTier::Tier0, 0.0)).collect()
}

/// Test: consensus dispatches every participant before awaiting any
#[tokio::test(start_paused = true)]
async fn test_consensus_runs_participants_in_parallel() {
    let invoker = ScriptedInvoker::new(vec![
        ("a", reply("alpha", 100)),
        ("b", reply("bravo response", 200)),
        ("c", reply("charlie", 300)),
    ]);
    let router = Router::new(
        Arc::new(registry(&invoker, &tier0(&["a", "b", "c"]), &["a", "b", "c"], &[])),
        RouterConfig::default(),
    );

    let options = RouteOptions {
        require_consensus: true,
        consensus_threshold: Some(3),
        ..Default::default()
    };
    let result = router.route_task("compare these approaches", &options).await;

    assert!(result.success);
    assert!(result.consensus);
    assert!(
        result.elapsed_ms >= 300 && result.elapsed_ms < 600,
        "elapsed {}ms, expected the slowest call rather than the sum",
        result.elapsed_ms
    );
    assert_eq!(result.backend_id.as_deref(), Some("b"));
    assert_eq!(result.response.as_deref(), Some("bravo response"));

    let detail = result.consensus_detail.expect("consensus detail");
    assert_eq!(detail.participants.len(), 3);
    let analysis = detail.analysis.expect("analysis");
    assert_eq!(analysis.total_backends, 3);
    assert_eq!(analysis.selected_backend, "b");
}

/// Test: a long prompt triggers consensus without any flag
#[tokio::test(start_paused = true)]
async fn test_long_prompt_triggers_consensus() {
    let invoker = ScriptedInvoker::new(vec![
        ("a", reply("short", 10)),
        ("b", reply("a considerably longer answer", 10)),
        ("c", reply("never asked", 10)),
    ]);
    let router = Router::new(
        Arc::new(registry(&invoker, &tier0(&["a", "b", "c"]), &["a", "b"], &["c"])),
        RouterConfig::default(),
    );

    let prompt = "word ".repeat(500);
    let result = router.route_task(&prompt, &RouteOptions::default()).await;

    assert!(result.consensus);
    assert_eq!(result.backend_id.as_deref(), Some("b"));
    let mut calls = invoker.calls();
    calls.sort();
    assert_eq!(calls, vec!["a", "b"], "default threshold uses two participants");
}

/// Test: complexity alone is enough to request consensus
#[tokio::test(start_paused = true)]
async fn test_complex_task_uses_consensus() {
    let invoker = ScriptedInvoker::new(vec![("a", reply("one", 5)), ("b", reply("three", 5))]);
    let router = Router::new(
        Arc::new(registry(&invoker, &tier0(&["a", "b"]), &["a"], &["b"])),
        RouterConfig::default(),
    );

    let options = RouteOptions {
        complexity: Complexity::Complex,
        ..Default::default()
    };
    let result = router.route_task("design a cache", &options).await;
    assert!(result.consensus);
    assert_eq!(invoker.calls().len(), 2);
}

/// Test: a single surviving participant is returned without aggregation
#[tokio::test(start_paused = true)]
async fn test_consensus_with_one_success_is_not_consensus() {
    let invoker = ScriptedInvoker::new(vec![("a", fail("boom")), ("b", reply("survivor", 50))]);
    let router = Router::new(
        Arc::new(registry(&invoker, &tier0(&["a", "b"]), &["a", "b"], &[])),
        RouterConfig::default(),
    );

    let options = RouteOptions {
        require_consensus: true,
        ..Default::default()
    };
    let result = router.route_task("anything", &options).await;

    assert!(result.success);
    assert!(!result.consensus);
    assert_eq!(result.backend_id.as_deref(), Some("b"));
    let detail = result.consensus_detail.expect("participants are still reported");
    assert!(detail.analysis.is_none());
    assert_eq!(detail.participants.iter().filter(|p| p.success).count(), 1);
    assert_eq!(router.health().failure_count("a"), 1);
}

/// Test: a failed participant reports how long it ran before failing
#[tokio::test(start_paused = true)]
async fn test_failed_participant_reports_elapsed_time() {
    let invoker = ScriptedInvoker::new(vec![
        ("slow-fail", fail_after("gateway timeout", 150)),
        ("b", reply("fine", 50)),
    ]);
    let router = Router::new(
        Arc::new(registry(&invoker, &tier0(&["slow-fail", "b"]), &["slow-fail", "b"], &[])),
        RouterConfig::default(),
    );

    let options = RouteOptions {
        require_consensus: true,
        ..Default::default()
    };
    let result = router.route_task("anything", &options).await;

    let detail = result.consensus_detail.expect("participants are reported");
    let failed = detail
        .participants
        .iter()
        .find(|p| p.backend_id == "slow-fail")
        .expect("failed participant");
    assert!(!failed.success);
    assert!(
        failed.elapsed_ms >= 150.0 && failed.elapsed_ms < 200.0,
        "elapsed {}ms",
        failed.elapsed_ms
    );
    assert!(failed.error.as_deref().unwrap_or_default().contains("gateway timeout"));
}

/// Test: consensus with zero successes lists every participant
#[tokio::test(start_paused = true)]
async fn test_consensus_all_failed() {
    let invoker = ScriptedInvoker::new(vec![("a", fail("down")), ("b", fail("also down"))]);
    let router = Router::new(
        Arc::new(registry(&invoker, &tier0(&["a", "b"]), &["a", "b"], &[])),
        RouterConfig::default(),
    );

    let options = RouteOptions {
        require_consensus: true,
        category: Some(TaskCategory::ComplexReasoning),
        ..Default::default()
    };
    let result = router.route_task("why", &options).await;

    assert!(!result.success);
    match result.error {
        Some(RouterError::AllConsensusFailed { category, attempts }) => {
            assert_eq!(category, TaskCategory::ComplexReasoning);
            let mut ids: Vec<_> = attempts.into_iter().map(|a| a.backend_id).collect();
            ids.sort();
            assert_eq!(ids, vec!["a", "b"]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

/// Test: a backend that trips the breaker is skipped, then self-heals
/// once the cooldown elapses
#[tokio::test(start_paused = true)]
async fn test_unhealthy_backend_skipped_until_cooldown_elapses() {
    let invoker = ScriptedInvoker::new(vec![("flaky", fail("500")), ("steady", reply("ok", 1))]);
    let router = Router::new(
        Arc::new(registry(
            &invoker,
            &tier0(&["flaky", "steady"]),
            &["flaky"],
            &["steady"],
        )),
        RouterConfig::default(),
    );

    for _ in 0..3 {
        let result = router.route_task("hello", &RouteOptions::default()).await;
        assert_eq!(result.backend_id.as_deref(), Some("steady"));
    }
    assert!(!router.health().is_available("flaky"));

    let before = invoker.calls().len();
    router.route_task("hello", &RouteOptions::default()).await;
    assert_eq!(invoker.calls()[before..], ["steady".to_string()]);

    tokio::time::advance(Duration::from_secs(600)).await;
    let before = invoker.calls().len();
    router.route_task("hello", &RouteOptions::default()).await;
    assert_eq!(invoker.calls()[before], "flaky", "flaky is retried after cooldown");
}

/// Test: explicit category overrides classification
#[tokio::test(start_paused = true)]
async fn test_explicit_category_is_reported() {
    let invoker = ScriptedInvoker::new(vec![("a", reply("done", 1))]);
    let router = Router::new(
        Arc::new(registry(&invoker, &tier0(&["a"]), &["a"], &[])),
        RouterConfig::default(),
    );

    let options = RouteOptions {
        category: Some(TaskCategory::MathResearch),
        ..Default::default()
    };
    let result = router.route_task("write a function", &options).await;
    assert_eq!(result.task_category, TaskCategory::MathResearch);

    let passed = invoker.options_for("a").expect("a was called");
    assert_eq!(passed.category, Some(TaskCategory::MathResearch));
}

/// Test: observers see each attempt and the final result
#[tokio::test(start_paused = true)]
async fn test_observer_receives_attempts_and_result() {
    let invoker = ScriptedInvoker::new(vec![("a", fail("nope")), ("b", reply("yes", 20))]);
    let observer = Arc::new(RecordingObserver::default());
    let router = Router::new(
        Arc::new(registry(&invoker, &tier0(&["a", "b"]), &["a", "b"], &[])),
        RouterConfig::default(),
    )
    .with_observer(observer.clone());

    router.route_task("hi", &RouteOptions::default()).await;

    let attempts = observer.attempts.lock().unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(!attempts[0].success);
    assert!(attempts[0].error.is_some());
    assert!(attempts[1].success);
    assert!(!attempts[1].consensus);

    let results = observer.results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
}

/// Test: status reports health, categories and selectable tier-0 backends
#[tokio::test(start_paused = true)]
async fn test_status_reflects_health() {
    let invoker = ScriptedInvoker::new(vec![("a", fail("x")), ("b", reply("y", 1))]);
    let router = Router::new(
        Arc::new(registry(&invoker, &tier0(&["a", "b"]), &["a", "b"], &[])),
        RouterConfig {
            max_failures: 1,
            ..Default::default()
        },
    );

    router.route_task("hi", &RouteOptions::default()).await;
    let status = router.status();

    assert_eq!(status.available_tier0, vec!["b".to_string()]);
    assert!(!status.health["a"].available);
    assert_eq!(status.specializations.len(), TaskCategory::all().len());
}

/// Test: routers sharing a health monitor and cooldown map see each other's
/// failures
#[tokio::test(start_paused = true)]
async fn test_routers_share_health_and_cooldowns() {
    let invoker = ScriptedInvoker::new(vec![
        ("flaky", fail("500")),
        (
            "limited",
            common::Script::Fail(council_router::InvokeError::RateLimited {
                retry_after: Some(Duration::from_secs(60)),
            }),
        ),
        ("steady", reply("ok", 1)),
    ]);
    let config = RouterConfig {
        max_failures: 1,
        ..Default::default()
    };
    let health = Arc::new(HealthMonitor::from_config(&config));
    let cooldowns = Arc::new(ProviderCooldowns::new());
    let build = || {
        Router::new(
            Arc::new(registry(
                &invoker,
                &tier0(&["flaky", "limited", "steady"]),
                &["flaky", "limited"],
                &["steady"],
            )),
            config.clone(),
        )
        .with_health(Arc::clone(&health))
        .with_cooldowns(Arc::clone(&cooldowns))
    };
    let first = build();
    let second = build();

    let result = first.route_task("hello", &RouteOptions::default()).await;
    assert_eq!(result.backend_id.as_deref(), Some("steady"));
    assert!(Arc::ptr_eq(first.health(), second.health()));
    assert!(second.cooldowns().is_cooling_down("limited"));

    let before = invoker.calls().len();
    let result = second.route_task("hello", &RouteOptions::default()).await;
    assert_eq!(result.backend_id.as_deref(), Some("steady"));
    assert_eq!(invoker.calls()[before..], ["steady".to_string()]);
}
