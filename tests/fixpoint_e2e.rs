use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use concept_sync::pattern::{lit, var};
use concept_sync::{
    record, terms, ActionError, ActionPattern, ActionResult, ActionTemplate, Concept, ConceptSet,
    Diagnostic, EngineConfig, Frames, OutcomeStatus, QueryContext, Record, SyncEngine, SyncError,
    SyncRegistry, SyncRule, Value,
};

/// `increment {n} -> {n: n + 1}`, `echo {v} -> {v}`, `fail {} -> error`.
struct Counter;

#[async_trait]
impl Concept for Counter {
    fn name(&self) -> &str {
        "Counter"
    }

    fn actions(&self) -> &[&'static str] {
        &["increment", "echo", "fail"]
    }

    async fn perform(&self, action: &str, input: &Record) -> ActionResult {
        match action {
            "increment" => {
                let n = input.get("n").and_then(Value::as_int).unwrap_or(0);
                Ok(record! { "n" => n + 1 })
            }
            "echo" => Ok(input.clone()),
            _ => Err(ActionError::new("counter failure")),
        }
    }
}

/// `wait {}` sleeps longer than any test budget.
struct Slow;

#[async_trait]
impl Concept for Slow {
    fn name(&self) -> &str {
        "Slow"
    }

    fn actions(&self) -> &[&'static str] {
        &["wait"]
    }

    async fn perform(&self, _action: &str, input: &Record) -> ActionResult {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(input.clone())
    }
}

fn engine(rules: Vec<SyncRule>, config: EngineConfig) -> SyncEngine {
    let registry = SyncRegistry::builder().extend(rules).unwrap().build();
    let concepts = ConceptSet::new()
        .with(Arc::new(Counter))
        .unwrap()
        .with(Arc::new(Slow))
        .unwrap();
    SyncEngine::new(registry, concepts, config).unwrap()
}

fn on_increment(name: &str) -> concept_sync::SyncRuleBuilder {
    SyncRule::builder(name).when(
        ActionPattern::new("Counter", "increment").outputs(terms! { "n" => var("n") }),
    )
}

#[tokio::test]
async fn cyclic_rule_is_stopped_by_depth_guard() {
    let rule = on_increment("Loop")
        .then(ActionTemplate::new("Counter", "increment").inputs(terms! { "n" => var("n") }))
        .build()
        .unwrap();
    let config = EngineConfig {
        max_cascade_depth: 5,
        ..EngineConfig::default()
    };
    let out = engine(vec![rule], config)
        .invoke("Counter", "increment", record! { "n" => 0 })
        .await
        .unwrap();

    assert_eq!(out.status, OutcomeStatus::CascadeLimitExceeded);
    // seed plus depths 1..=5; committed effects stand.
    assert_eq!(out.trace.len(), 6);
    assert_eq!(out.stats.max_depth, 5);
    assert!(matches!(
        out.diagnostics.last(),
        Some(Diagnostic::CascadeLimit { depth: 6, .. })
    ));
}

#[tokio::test]
async fn cyclic_rule_is_stopped_by_dispatch_budget() {
    let rule = on_increment("Loop")
        .then(ActionTemplate::new("Counter", "increment").inputs(terms! { "n" => var("n") }))
        .build()
        .unwrap();
    let config = EngineConfig {
        max_dispatches: 3,
        ..EngineConfig::default()
    };
    let out = engine(vec![rule], config)
        .invoke("Counter", "increment", record! { "n" => 0 })
        .await
        .unwrap();

    assert_eq!(out.status, OutcomeStatus::CascadeLimitExceeded);
    assert_eq!(out.stats.dispatches, 3);
    assert_eq!(out.trace.len(), 4);
}

#[tokio::test]
async fn identical_frames_fire_once() {
    // echo reproduces its input, so the second scan yields the same frame.
    let rule = SyncRule::builder("Echo")
        .when(ActionPattern::new("Counter", "echo").outputs(terms! { "v" => var("v") }))
        .then(ActionTemplate::new("Counter", "echo").inputs(terms! { "v" => var("v") }))
        .build()
        .unwrap();
    let out = engine(vec![rule], EngineConfig::default())
        .invoke("Counter", "echo", record! { "v" => "x" })
        .await
        .unwrap();

    assert!(out.is_completed());
    assert_eq!(out.trace.len(), 2);
    assert_eq!(out.stats.deduplicated, 1);
}

#[tokio::test]
async fn acyclic_chain_reaches_fixpoint() {
    let first = on_increment("First")
        .then(ActionTemplate::new("Counter", "echo").inputs(terms! { "v" => var("n") }))
        .build()
        .unwrap();
    let second = SyncRule::builder("Second")
        .when(ActionPattern::new("Counter", "echo").outputs(terms! { "v" => lit(1) }))
        .then(ActionTemplate::new("Counter", "fail"))
        .build()
        .unwrap();
    let out = engine(vec![first, second], EngineConfig::default())
        .invoke("Counter", "increment", record! { "n" => 0 })
        .await
        .unwrap();

    assert!(out.is_completed());
    let depths: Vec<u32> = out.trace.iter().map(|e| e.depth).collect();
    assert_eq!(depths, vec![0, 1, 2]);
    // The failing action is recorded, not raised.
    assert!(out.trace.get(2).unwrap().outcome.is_error());
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].kind(), "action_failed");
}

#[tokio::test]
async fn where_failure_is_isolated_to_its_rule() {
    let failing = on_increment("Failing")
        .where_fn(|_frames: Frames, _ctx: QueryContext| async move {
            Err::<Frames, _>(SyncError::where_failed("lookup unavailable"))
        })
        .then(ActionTemplate::new("Counter", "echo").inputs(terms! { "v" => var("n") }))
        .build()
        .unwrap();
    let healthy = on_increment("Healthy")
        .then(ActionTemplate::new("Counter", "echo").inputs(terms! { "v" => var("n") }))
        .build()
        .unwrap();
    let out = engine(vec![failing, healthy], EngineConfig::default())
        .invoke("Counter", "increment", record! { "n" => 0 })
        .await
        .unwrap();

    assert!(out.is_completed());
    assert_eq!(out.trace.find("Counter", "echo").count(), 1);
    match &out.diagnostics[..] {
        [Diagnostic::WhereFailed { sync, reason, frames, .. }] => {
            assert_eq!(sync, "Failing");
            assert_eq!(reason, "lookup unavailable");
            assert_eq!(frames[0]["n"], 1);
        }
        other => panic!("unexpected diagnostics: {other:?}"),
    }
}

#[tokio::test]
async fn where_panic_is_isolated_to_its_rule() {
    let panicking = on_increment("Panicking")
        .where_fn(|frames: Frames, _ctx: QueryContext| async move {
            if !frames.is_empty() {
                panic!("author bug");
            }
            Ok::<_, SyncError>(frames)
        })
        .then(ActionTemplate::new("Counter", "echo").inputs(terms! { "v" => var("n") }))
        .build()
        .unwrap();
    let healthy = on_increment("Healthy")
        .then(ActionTemplate::new("Counter", "echo").inputs(terms! { "v" => var("n") }))
        .build()
        .unwrap();
    let out = engine(vec![panicking, healthy], EngineConfig::default())
        .invoke("Counter", "increment", record! { "n" => 0 })
        .await
        .unwrap();

    assert!(out.is_completed());
    assert_eq!(out.trace.find("Counter", "echo").count(), 1);
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].kind(), "where_panicked");
}

#[tokio::test]
async fn where_clause_enriches_frames_for_then() {
    let doubled = on_increment("Doubled")
        .where_fn(|frames: Frames, _ctx: QueryContext| async move {
            Ok::<_, SyncError>(frames.bind("twice", |f| {
                let n = f.get("n")?.as_int()?;
                Some(Value::Int(n * 2))
            }))
        })
        .binds(["twice"])
        .then(ActionTemplate::new("Counter", "echo").inputs(terms! { "v" => var("twice") }))
        .build()
        .unwrap();
    let out = engine(vec![doubled], EngineConfig::default())
        .invoke("Counter", "increment", record! { "n" => 4 })
        .await
        .unwrap();

    let echo = out.trace.find("Counter", "echo").next().unwrap();
    assert_eq!(echo.input.get("v"), Some(&Value::Int(10)));
}

#[tokio::test]
async fn declared_but_unbound_variable_skips_the_firing() {
    let forgetful = on_increment("Forgetful")
        .where_fn(|frames: Frames, _ctx: QueryContext| async move { Ok::<_, SyncError>(frames) })
        .binds(["missing"])
        .then(ActionTemplate::new("Counter", "echo").inputs(terms! { "v" => var("missing") }))
        .build()
        .unwrap();
    let out = engine(vec![forgetful], EngineConfig::default())
        .invoke("Counter", "increment", record! { "n" => 0 })
        .await
        .unwrap();

    assert!(out.is_completed());
    assert_eq!(out.trace.len(), 1);
    assert!(matches!(
        &out.diagnostics[..],
        [Diagnostic::UnboundVariable { variable, .. }] if variable == "missing"
    ));
}

#[tokio::test(start_paused = true)]
async fn request_budget_stops_slow_cascades() {
    let rule = on_increment("Slowly")
        .then(ActionTemplate::new("Slow", "wait"))
        .build()
        .unwrap();
    let config = EngineConfig {
        request_timeout_ms: Some(10),
        ..EngineConfig::default()
    };
    let out = engine(vec![rule], config)
        .invoke("Counter", "increment", record! { "n" => 0 })
        .await
        .unwrap();

    assert_eq!(out.status, OutcomeStatus::TimedOut);
    // The seed stands; the slow action never completed.
    assert_eq!(out.trace.len(), 1);
    assert!(matches!(
        out.diagnostics.last(),
        Some(Diagnostic::TimedOut { after_ms: 10 })
    ));
}

#[tokio::test]
async fn engine_rejects_rules_with_unknown_actions() {
    let rule = on_increment("Typo")
        .then(ActionTemplate::new("Counter", "decrement"))
        .build()
        .unwrap();
    let registry = SyncRegistry::builder().with(rule).unwrap().build();
    let concepts = ConceptSet::new().with(Arc::new(Counter)).unwrap();
    let err = SyncEngine::new(registry, concepts, EngineConfig::default()).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("Counter.decrement"));
}
