//! Scenario tests for the workflow execution engine.
//!
//! Providers are scripted with `MockInvoker` and the audit trail is captured
//! with `MemorySink`, so no provider or database is required.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use capabilities::mock::{MockBehaviour, MockInvoker};

use crate::execution::{Execution, ExecutionResult, ExecutionStatus, ExecutionUpdate, StepLog, StepStatus};
use crate::models::{EdgeSpec, NodeSpec, WorkflowDefinition};
use crate::sink::{MemorySink, PersistenceSink};
use crate::{ExecutionControl, WorkflowExecutor};

fn node(id: &str) -> NodeSpec {
    NodeSpec::new(id, "echo", "run")
}

fn executor(mock: &MockInvoker) -> WorkflowExecutor {
    WorkflowExecutor::new(Arc::new(mock.clone()))
}

async fn run(executor: &WorkflowExecutor, def: &WorkflowDefinition) -> ExecutionResult {
    run_with(executor, def, json!({ "origin": "trigger" }), Map::new()).await
}

async fn run_with(
    executor: &WorkflowExecutor,
    def: &WorkflowDefinition,
    input: Value,
    config: Map<String, Value>,
) -> ExecutionResult {
    executor
        .execute(def, "acme", Uuid::new_v4(), Uuid::new_v4(), input, &config)
        .await
}

fn step_ids(logs: &[StepLog]) -> Vec<&str> {
    logs.iter().map(|l| l.step_id.as_str()).collect()
}

// ============================================================
// Definition errors
// ============================================================

#[tokio::test]
async fn missing_fields_fail_fast_with_one_error_each() {
    let mock = MockInvoker::new();
    let def = WorkflowDefinition {
        name: None,
        version: 1,
        nodes: None,
        edges: None,
        entry_point: None,
    };

    let result = run(&executor(&mock), &def).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.errors.len(), 3);
    assert!(result.errors.iter().all(|e| e.step.is_none()));
    assert_eq!(result.step_count, 0);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn duplicate_node_id_is_a_single_definition_error() {
    let mock = MockInvoker::new();
    let def = WorkflowDefinition::new(vec![node("a"), node("a")], vec![], "a");

    let result = run(&executor(&mock), &def).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].error, "duplicate node ID: 'a'");
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn rejected_run_is_recorded_as_failed() {
    let mock = MockInvoker::new();
    let sink = Arc::new(MemorySink::new());
    let engine = executor(&mock).with_sink(sink.clone());
    let def = WorkflowDefinition::new(vec![node("a")], vec![], "ghost");
    let execution_id = Uuid::new_v4();

    let result = engine
        .execute(&def, "acme", Uuid::new_v4(), execution_id, json!({}), &Map::new())
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    let updates = sink.updates(execution_id);
    assert_eq!(updates.last().unwrap().status, ExecutionStatus::Failed);
    assert!(sink.step_logs(execution_id).is_empty());
}

#[tokio::test]
async fn empty_entry_point_is_rejected_before_any_step() {
    let mock = MockInvoker::new();
    let mut def = WorkflowDefinition::linear(&["a"], "echo");
    def.entry_point = Some(String::new());

    let result = run(&executor(&mock), &def).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].step.is_none());
    assert_eq!(result.errors[0].error, "missing required field 'entry_point'");
    assert_eq!(result.step_count, 0);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn signal_for_a_rejected_run_is_cleared() {
    let mock = MockInvoker::new();
    let engine = executor(&mock);
    let execution_id = Uuid::new_v4();
    engine.control().cancel(execution_id);
    let def = WorkflowDefinition::new(vec![node("a")], vec![], "ghost");

    let result = engine
        .execute(&def, "acme", Uuid::new_v4(), execution_id, json!({}), &Map::new())
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(engine.control().signal(execution_id).is_none());
}

// ============================================================
// Traversal
// ============================================================

#[tokio::test]
async fn linear_chain_completes_in_order() {
    let mock = MockInvoker::new();
    let sink = Arc::new(MemorySink::new());
    let engine = executor(&mock).with_sink(sink.clone());
    let def = WorkflowDefinition::linear(&["a", "b", "c"], "echo");
    let execution_id = Uuid::new_v4();

    let result = engine
        .execute(&def, "acme", Uuid::new_v4(), execution_id, json!({}), &Map::new())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.step_count, 3);
    assert!(result.errors.is_empty());
    let keys: Vec<&str> = result.results.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert_eq!(result.output, json!({ "step": "c" }));

    let logs = sink.step_logs(execution_id);
    assert_eq!(step_ids(&logs), vec!["a", "b", "c"]);
    let indices: Vec<u32> = logs.iter().map(|l| l.step_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(logs.iter().all(|l| l.status == StepStatus::Success));
}

#[tokio::test]
async fn failing_last_step_fails_the_run() {
    let mock = MockInvoker::new().failing("b", "provider unavailable");
    let def = WorkflowDefinition::linear(&["a", "b"], "echo");

    let result = run(&executor(&mock), &def).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].step.as_deref(), Some("b"));
    assert_eq!(result.errors[0].capability.as_deref(), Some("echo"));
    assert_eq!(result.errors[0].error, "provider unavailable");
    assert!(result.results.contains_key("a"));
    assert!(!result.results.contains_key("b"));
}

#[tokio::test]
async fn success_guard_stops_traversal_after_failure() {
    let mock = MockInvoker::new().failing("x", "boom");
    let def = WorkflowDefinition::new(
        vec![node("x"), node("y")],
        vec![EdgeSpec::when("x", "y", "success")],
        "x",
    );

    let result = run(&executor(&mock), &def).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.step_count, 1);
    assert_eq!(mock.invoked_steps(), vec!["x"]);
}

#[tokio::test]
async fn unguarded_edge_continues_after_failure() {
    let mock = MockInvoker::new().failing("a", "boom");
    let def = WorkflowDefinition::linear(&["a", "b"], "echo");

    let result = run(&executor(&mock), &def).await;

    assert_eq!(mock.invoked_steps(), vec!["a", "b"]);
    assert_eq!(result.step_count, 2);
    assert_eq!(result.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn terminal_node_ends_traversal() {
    let mock = MockInvoker::new();
    let sink = Arc::new(MemorySink::new());
    let engine = executor(&mock).with_sink(sink.clone());
    let def = WorkflowDefinition::new(vec![node("a"), node("b")], vec![EdgeSpec::new("a", "b")], "a");
    let execution_id = Uuid::new_v4();

    let result = engine
        .execute(&def, "acme", Uuid::new_v4(), execution_id, json!({}), &Map::new())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(mock.invoked_steps(), vec!["a", "b"]);
    assert_eq!(sink.step_logs(execution_id).len(), 2);
    assert_eq!(result.current_step.as_deref(), Some("b"));
}

#[tokio::test]
async fn unreachable_nodes_are_not_run() {
    let mock = MockInvoker::new();
    let def = WorkflowDefinition::new(
        vec![node("a"), node("b"), node("island")],
        vec![EdgeSpec::new("a", "b")],
        "a",
    );

    let result = run(&executor(&mock), &def).await;

    assert_eq!(result.step_count, 2);
    assert!(!result.results.contains_key("island"));
}

#[tokio::test]
async fn unknown_condition_edge_is_always_taken() {
    let mock = MockInvoker::new().failing("x", "boom");
    let def = WorkflowDefinition::new(
        vec![node("x"), node("y")],
        vec![EdgeSpec::when("x", "y", "manager_approved")],
        "x",
    );

    let result = run(&executor(&mock), &def).await;

    assert_eq!(mock.invoked_steps(), vec!["x", "y"]);
    assert_eq!(result.step_count, 2);
}

#[tokio::test]
async fn error_branch_handles_failure() {
    let mock = MockInvoker::new().failing("charge", "card declined");
    let def = WorkflowDefinition::new(
        vec![node("charge"), node("receipt"), node("notify_failure")],
        vec![
            EdgeSpec::when("charge", "receipt", "success"),
            EdgeSpec::when("charge", "notify_failure", "error"),
        ],
        "charge",
    );

    let result = run(&executor(&mock), &def).await;

    assert_eq!(mock.invoked_steps(), vec!["charge", "notify_failure"]);
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.results.contains_key("notify_failure"));
}

#[tokio::test]
async fn first_matching_edge_wins_in_declaration_order() {
    let mock = MockInvoker::new();
    let def = WorkflowDefinition::new(
        vec![node("a"), node("b"), node("c")],
        vec![EdgeSpec::when("a", "b", "success"), EdgeSpec::new("a", "c")],
        "a",
    );

    run(&executor(&mock), &def).await;

    assert_eq!(mock.invoked_steps(), vec!["a", "b"]);
}

#[tokio::test]
async fn has_data_routes_on_extracted_output() {
    let mock = MockInvoker::new()
        .returning("fetch", json!({ "results": [] }))
        .returning("fetch_more", json!({ "results": [1, 2] }));
    let def = WorkflowDefinition::new(
        vec![node("fetch"), node("process"), node("fetch_more"), node("process_more")],
        vec![
            EdgeSpec::when("fetch", "process", "has_data"),
            EdgeSpec::new("fetch", "fetch_more"),
            EdgeSpec::when("fetch_more", "process_more", "has_data"),
        ],
        "fetch",
    );

    run(&executor(&mock), &def).await;

    assert_eq!(mock.invoked_steps(), vec!["fetch", "fetch_more", "process_more"]);
}

#[tokio::test]
async fn extracted_output_is_threaded_to_the_next_step() {
    let mock = MockInvoker::new().returning("a", json!({ "data": { "label": "spam" }, "latency": 3 }));
    let def = WorkflowDefinition::linear(&["a", "b"], "echo");

    let result = run(&executor(&mock), &def).await;

    let calls = mock.calls();
    assert_eq!(calls[0].request.input, json!({ "origin": "trigger" }));
    assert_eq!(calls[1].request.input, json!({ "label": "spam" }));
    assert_eq!(result.results["a"]["latency"], 3);
    assert_eq!(calls[1].tenant_id, "acme");
}

#[tokio::test]
async fn custom_extractor_replaces_default_rule() {
    let mock = MockInvoker::new().returning("a", json!({ "payload": 42, "data": "ignored" }));
    let engine = executor(&mock).with_extractor(Arc::new(|v: &Value| v["payload"].clone()));
    let def = WorkflowDefinition::linear(&["a"], "echo");

    let result = run(&engine, &def).await;

    assert_eq!(result.output, json!(42));
}

#[tokio::test]
async fn custom_condition_is_consulted() {
    let mock = MockInvoker::new().returning("score", json!({ "output": { "score": 0.95 } }));
    let engine = executor(&mock).with_condition("confident", |e: &Execution| {
        e.current_data["score"].as_f64().is_some_and(|s| s > 0.9)
    });
    let def = WorkflowDefinition::new(
        vec![node("score"), node("auto_approve"), node("manual_review")],
        vec![
            EdgeSpec::when("score", "auto_approve", "confident"),
            EdgeSpec::new("score", "manual_review"),
        ],
        "score",
    );

    run(&engine, &def).await;

    assert_eq!(mock.invoked_steps(), vec!["score", "auto_approve"]);
}

// ============================================================
// Determinism & concurrency
// ============================================================

#[tokio::test]
async fn identical_runs_produce_identical_traces() {
    let mock = MockInvoker::new().returning("b", json!({ "data": { "n": 2 } }));
    let sink = Arc::new(MemorySink::new());
    let engine = executor(&mock).with_sink(sink.clone());
    let def = WorkflowDefinition::new(
        vec![node("a"), node("b"), node("c"), node("d")],
        vec![
            EdgeSpec::new("a", "b"),
            EdgeSpec::when("b", "c", "has_data"),
            EdgeSpec::new("b", "d"),
        ],
        "a",
    );

    let trace = |logs: Vec<StepLog>| -> Vec<(u32, String, StepStatus, Value, Option<Value>)> {
        logs.into_iter()
            .map(|l| (l.step_index, l.step_id, l.status, l.input, l.output))
            .collect()
    };

    let (first_id, second_id) = (Uuid::new_v4(), Uuid::new_v4());
    let first = engine
        .execute(&def, "acme", Uuid::new_v4(), first_id, json!({ "k": 1 }), &Map::new())
        .await;
    let second = engine
        .execute(&def, "acme", Uuid::new_v4(), second_id, json!({ "k": 1 }), &Map::new())
        .await;

    assert_eq!(first.step_count, second.step_count);
    assert_eq!(first.results, second.results);
    assert_eq!(first.output, second.output);
    assert_eq!(trace(sink.step_logs(first_id)), trace(sink.step_logs(second_id)));
}

#[tokio::test]
async fn concurrent_executions_do_not_share_state() {
    let mock = MockInvoker::new().failing("bad", "boom");
    let engine = Arc::new(executor(&mock));
    let good = WorkflowDefinition::linear(&["a", "b"], "echo");
    let bad = WorkflowDefinition::linear(&["bad"], "echo");

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            let def = if i % 2 == 0 { good.clone() } else { bad.clone() };
            tokio::spawn(async move {
                engine
                    .execute(&def, &format!("tenant-{i}"), Uuid::new_v4(), Uuid::new_v4(), json!({}), &Map::new())
                    .await
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap();
        if i % 2 == 0 {
            assert_eq!(result.status, ExecutionStatus::Completed);
            assert_eq!(result.step_count, 2);
        } else {
            assert_eq!(result.status, ExecutionStatus::Failed);
            assert_eq!(result.errors.len(), 1);
        }
    }
    assert_eq!(mock.call_count(), 12);
}

// ============================================================
// Budget, retry, timeout
// ============================================================

#[tokio::test]
async fn cyclic_definition_is_bounded_by_step_budget() {
    let mock = MockInvoker::new();
    let def = WorkflowDefinition::new(
        vec![node("ping"), node("pong")],
        vec![EdgeSpec::new("ping", "pong"), EdgeSpec::new("pong", "ping")],
        "ping",
    );
    let config = json!({ "max_steps": 5 }).as_object().cloned().unwrap();

    let result = run_with(&executor(&mock), &def, json!({}), config).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.step_count, 5);
    assert_eq!(mock.call_count(), 5);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].error, "step budget of 5 exhausted");
    assert!(result.errors[0].step.is_none());
}

#[tokio::test(start_paused = true)]
async fn run_config_enables_retry() {
    let mock = MockInvoker::new().on("a", MockBehaviour::Flaky { failures: 1, value: json!({ "ok": true }) });
    let def = WorkflowDefinition::linear(&["a"], "echo");
    let config = json!({ "max_retries": 2, "retry_base_delay_ms": 10 }).as_object().cloned().unwrap();

    let result = run_with(&executor(&mock), &def, json!({}), config).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(mock.call_count(), 2);
    assert_eq!(result.step_count, 1);
}

#[tokio::test(start_paused = true)]
async fn retry_is_off_by_default() {
    let mock = MockInvoker::new().on("a", MockBehaviour::Flaky { failures: 1, value: json!({}) });
    let def = WorkflowDefinition::linear(&["a"], "echo");

    let result = run(&executor(&mock), &def).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn node_timeout_overrides_run_timeout() {
    let mock = MockInvoker::new().on(
        "slow",
        MockBehaviour::Delay { duration: Duration::from_secs(2), value: json!({}) },
    );
    let def = WorkflowDefinition::new(
        vec![node("slow").with_config("timeout_ms", json!(100))],
        vec![],
        "slow",
    );

    let result = run(&executor(&mock), &def).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.errors[0].error, "capability 'echo' timed out after 100ms");
}

// ============================================================
// Control signals
// ============================================================

#[tokio::test]
async fn canceled_before_start_runs_nothing() {
    let mock = MockInvoker::new();
    let engine = executor(&mock);
    let execution_id = Uuid::new_v4();
    engine.control().cancel(execution_id);

    let result = engine
        .execute(
            &WorkflowDefinition::linear(&["a", "b"], "echo"),
            "acme",
            Uuid::new_v4(),
            execution_id,
            json!({}),
            &Map::new(),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Canceled);
    assert_eq!(result.step_count, 0);
    assert_eq!(mock.call_count(), 0);
    assert!(engine.control().signal(execution_id).is_none());
}

#[tokio::test]
async fn cancel_between_nodes_keeps_partial_results() {
    let mock = MockInvoker::new();
    let control = ExecutionControl::new();
    let signal_board = control.clone();
    let engine = executor(&mock)
        .with_control(control)
        .with_condition("cancel_now", move |e: &Execution| {
            signal_board.cancel(e.id);
            true
        });
    let def = WorkflowDefinition::new(
        vec![node("a"), node("b")],
        vec![EdgeSpec::when("a", "b", "cancel_now")],
        "a",
    );

    let result = run(&engine, &def).await;

    assert_eq!(result.status, ExecutionStatus::Canceled);
    assert_eq!(result.step_count, 1);
    assert!(result.results.contains_key("a"));
    assert_eq!(mock.invoked_steps(), vec!["a"]);
}

#[tokio::test]
async fn pause_between_nodes() {
    let mock = MockInvoker::new();
    let control = ExecutionControl::new();
    let signal_board = control.clone();
    let engine = executor(&mock)
        .with_control(control)
        .with_condition("pause_now", move |e: &Execution| {
            signal_board.pause(e.id);
            true
        });
    let def = WorkflowDefinition::new(
        vec![node("a"), node("b"), node("c")],
        vec![EdgeSpec::new("a", "b"), EdgeSpec::when("b", "c", "pause_now")],
        "a",
    );

    let result = run(&engine, &def).await;

    assert_eq!(result.status, ExecutionStatus::Paused);
    assert_eq!(result.step_count, 2);
    assert_eq!(result.current_step.as_deref(), Some("b"));
}

// ============================================================
// Fault containment & persistence
// ============================================================

#[tokio::test]
async fn panicking_provider_becomes_a_failed_result() {
    let mock = MockInvoker::new().on("b", MockBehaviour::Panic("provider exploded".into()));
    let def = WorkflowDefinition::linear(&["a", "b", "c"], "echo");

    let result = run(&executor(&mock), &def).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].step.as_deref(), Some("b"));
    assert_eq!(result.errors[0].error, "engine panicked: provider exploded");
    assert!(result.results.contains_key("a"));
    assert_eq!(mock.invoked_steps(), vec!["a", "b"]);
}

#[tokio::test]
async fn failing_sink_does_not_change_the_outcome() {
    let mock = MockInvoker::new();
    let engine = executor(&mock).with_sink(Arc::new(MemorySink::failing()));

    let result = run(&engine, &WorkflowDefinition::linear(&["a", "b"], "echo")).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.step_count, 2);
}

/// Panics on every call.
struct ExplodingSink;

#[async_trait]
impl PersistenceSink for ExplodingSink {
    async fn append_step_log(&self, _execution_id: Uuid, _entry: &StepLog) -> anyhow::Result<()> {
        panic!("step log store exploded")
    }

    async fn update_execution(&self, _execution_id: Uuid, _update: &ExecutionUpdate) -> anyhow::Result<()> {
        panic!("execution store exploded")
    }
}

#[tokio::test]
async fn panicking_sink_does_not_change_the_outcome() {
    let mock = MockInvoker::new();
    let engine = executor(&mock).with_sink(Arc::new(ExplodingSink));

    let result = run(&engine, &WorkflowDefinition::linear(&["a", "b"], "echo")).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(result.errors.is_empty());
    assert_eq!(result.step_count, 2);
    assert_eq!(mock.invoked_steps(), vec!["a", "b"]);
}

#[tokio::test]
async fn panicking_sink_on_a_rejected_run_still_returns() {
    let mock = MockInvoker::new();
    let engine = executor(&mock).with_sink(Arc::new(ExplodingSink));
    let def = WorkflowDefinition::new(vec![node("a")], vec![], "ghost");

    let result = run(&engine, &def).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.errors.len(), 1);
}

#[tokio::test]
async fn sink_sees_start_and_one_terminal_update() {
    let mock = MockInvoker::new();
    let sink = Arc::new(MemorySink::new());
    let engine = executor(&mock).with_sink(sink.clone() as Arc<dyn PersistenceSink>);
    let execution_id = Uuid::new_v4();

    engine
        .execute(
            &WorkflowDefinition::linear(&["a"], "echo"),
            "acme",
            Uuid::new_v4(),
            execution_id,
            json!({}),
            &Map::new(),
        )
        .await;

    let statuses: Vec<ExecutionStatus> = sink.updates(execution_id).iter().map(|u| u.status).collect();
    assert_eq!(statuses, vec![ExecutionStatus::Running, ExecutionStatus::Completed]);
}
