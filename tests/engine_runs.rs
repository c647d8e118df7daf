//! End-to-end engine behaviour: scoping, ordering, failure policy, history.

use std::sync::{Arc, Mutex};

use dagrun::{
    AlertSink, DependencyGraph, Error, ExecutionEngine, FnTask, ParameterStore, RunOptions,
    RunStatus, WorkflowFailure,
};
use dagrun_test_utils::builders::{GraphBuilder, executed};
use dagrun_test_utils::init_tracing;
use serde_json::json;

fn chain_graph() -> (DependencyGraph, dagrun_test_utils::probe_task::ExecutionLog) {
    GraphBuilder::new("chain")
        .task("a")
        .task("b")
        .task("c")
        .chain(&["a", "b", "c"])
        .build()
}

#[tokio::test]
async fn full_run_executes_every_task_in_dependency_order() {
    init_tracing();
    let (mut graph, log) = chain_graph();
    let mut engine = ExecutionEngine::new();

    let results = engine
        .execute(&mut graph, &ParameterStore::new(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(executed(&log), ["a", "b", "c"]);
    assert_eq!(results.len(), 3);

    let record = &engine.history()[0];
    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.completed, ["a", "b", "c"]);
    assert!(record.failed_task.is_none());
    assert!(record.uncompleted.is_empty());
}

#[tokio::test]
async fn start_from_skips_everything_upstream() {
    init_tracing();
    let (mut graph, log) = chain_graph();
    let mut engine = ExecutionEngine::new();

    let results = engine
        .execute(&mut graph, &ParameterStore::new(), &RunOptions::start_from("b"))
        .await
        .unwrap();

    assert_eq!(executed(&log), ["b", "c"]);
    assert!(results.contains_key("b"));
    assert!(results.contains_key("c"));
    assert!(!results.contains_key("a"));
}

#[tokio::test]
async fn only_tasks_wins_over_start_from() {
    init_tracing();
    let (mut graph, log) = chain_graph();
    let mut engine = ExecutionEngine::new();

    let opts = RunOptions {
        start_from: Some("a".to_string()),
        only_tasks: Some(vec!["c".to_string()]),
        ..RunOptions::default()
    };
    engine
        .execute(&mut graph, &ParameterStore::new(), &opts)
        .await
        .unwrap();

    assert_eq!(executed(&log), ["c"]);
}

#[tokio::test]
async fn tasks_receive_results_of_direct_upstreams_only() {
    init_tracing();
    // a -> b -> d, a -> c -> d
    let (mut graph, _log) = GraphBuilder::new("diamond")
        .task("a")
        .task("b")
        .task("c")
        .task("d")
        .edge("a", "b")
        .edge("a", "c")
        .edge("b", "d")
        .edge("c", "d")
        .build();
    let mut engine = ExecutionEngine::new();

    let results = engine
        .execute(&mut graph, &ParameterStore::new(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(results["a"]["upstream"], json!([]));
    assert_eq!(results["d"]["upstream"], json!(["b", "c"]));
}

#[tokio::test]
async fn fail_fast_aborts_before_downstream_tasks() {
    init_tracing();
    let (mut graph, log) = GraphBuilder::new("chain")
        .task("a")
        .failing_task("b")
        .task("c")
        .chain(&["a", "b", "c"])
        .build();
    let mut engine = ExecutionEngine::new();

    let err = engine
        .execute(&mut graph, &ParameterStore::new(), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TaskExecution { task, .. } if task == "b"));
    // c was never attempted.
    assert_eq!(executed(&log), ["a", "b"]);

    let record = &engine.history()[0];
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.completed, ["a"]);
    assert_eq!(record.failed_task.as_deref(), Some("b"));
    assert_eq!(record.uncompleted, ["c"]);
    assert!(record.error.as_deref().unwrap_or_default().contains("on purpose"));
}

#[tokio::test]
async fn without_fail_fast_downstream_tasks_are_still_attempted() {
    init_tracing();
    let (mut graph, log) = GraphBuilder::new("chain")
        .task("a")
        .failing_task("b")
        .task("c")
        .chain(&["a", "b", "c"])
        .build();
    let mut engine = ExecutionEngine::new();

    let opts = RunOptions {
        fail_fast: false,
        ..RunOptions::default()
    };
    let err = engine
        .execute(&mut graph, &ParameterStore::new(), &opts)
        .await
        .unwrap_err();

    // The failure is still reported, but c ran anyway.
    assert!(matches!(err, Error::TaskExecution { task, .. } if task == "b"));
    assert_eq!(executed(&log), ["a", "b", "c"]);

    let record = &engine.history()[0];
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.completed, ["a", "c"]);
    assert_eq!(record.failed_task.as_deref(), Some("b"));
}

#[tokio::test]
async fn unknown_scope_filter_fails_without_running_anything() {
    init_tracing();
    let (mut graph, log) = chain_graph();
    let mut engine = ExecutionEngine::new();

    let err = engine
        .execute(
            &mut graph,
            &ParameterStore::new(),
            &RunOptions::only_tasks(["ghost"]),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownTask(id) if id == "ghost"));
    assert!(executed(&log).is_empty());
    // The run is still part of the history.
    assert_eq!(engine.history().len(), 1);
    assert_eq!(engine.history()[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn cyclic_graph_is_recorded_and_rejected_before_any_task_runs() {
    init_tracing();
    let (mut graph, log) = GraphBuilder::new("loop")
        .task("a")
        .task("b")
        .edge("a", "b")
        .edge("b", "a")
        .build();
    let mut engine = ExecutionEngine::new();

    let err = engine
        .execute(&mut graph, &ParameterStore::new(), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cycle));
    assert!(executed(&log).is_empty());
    assert_eq!(engine.history()[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn task_params_resolve_against_the_run_store() {
    init_tracing();
    let (mut graph, _log) = GraphBuilder::new("templated")
        .task("report")
        .param("table", json!("events_${region}"))
        .build();

    let mut store = ParameterStore::new();
    store.set([("region".to_string(), json!("eu"))]);

    let mut engine = ExecutionEngine::new();
    let results = engine
        .execute(&mut graph, &store, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(results["report"]["params"]["table"], json!("events_eu"));

    // The record keeps the snapshot of the store the run used.
    assert_eq!(engine.history()[0].params["region"], json!("eu"));
}

#[tokio::test]
async fn cyclic_parameter_fails_the_task_that_uses_it() {
    init_tracing();
    let (mut graph, _log) = GraphBuilder::new("templated")
        .task("report")
        .param("a", json!("${a}"))
        .build();

    let mut store = ParameterStore::new();
    store.set([("a".to_string(), json!("${a}"))]);

    let mut engine = ExecutionEngine::new();
    let err = engine
        .execute(&mut graph, &store, &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TaskExecution { task, message }
        if task == "report" && message.contains("reference cycle")));
}

#[derive(Default)]
struct CollectingAlert {
    failures: Mutex<Vec<WorkflowFailure>>,
}

impl AlertSink for CollectingAlert {
    fn workflow_failed(&self, failure: &WorkflowFailure) {
        self.failures
            .lock()
            .expect("alert lock poisoned")
            .push(failure.clone());
    }
}

#[tokio::test]
async fn failed_runs_emit_one_alert_with_the_full_payload() {
    init_tracing();
    let (mut graph, _log) = GraphBuilder::new("nightly")
        .task("a")
        .failing_task("b")
        .task("c")
        .chain(&["a", "b", "c"])
        .build();

    let alert = Arc::new(CollectingAlert::default());
    let mut engine = ExecutionEngine::with_alert(alert.clone());

    let _ = engine
        .execute(&mut graph, &ParameterStore::new(), &RunOptions::default())
        .await;

    let failures = alert.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    let failure = &failures[0];
    assert_eq!(failure.workflow, "nightly");
    assert_eq!(failure.failed_task, "b");
    assert_eq!(failure.completed, ["a"]);
    assert_eq!(failure.uncompleted, ["c"]);
    assert!(failure.error.contains("on purpose"));
}

#[tokio::test]
async fn successful_runs_emit_no_alert() {
    init_tracing();
    let (mut graph, _log) = chain_graph();
    let alert = Arc::new(CollectingAlert::default());
    let mut engine = ExecutionEngine::with_alert(alert.clone());

    engine
        .execute(&mut graph, &ParameterStore::new(), &RunOptions::default())
        .await
        .unwrap();

    assert!(alert.failures.lock().unwrap().is_empty());
}

#[tokio::test]
async fn history_appends_one_record_per_run() {
    init_tracing();
    let mut engine = ExecutionEngine::new();

    for _ in 0..3 {
        let (mut graph, _log) = chain_graph();
        engine
            .execute(&mut graph, &ParameterStore::new(), &RunOptions::default())
            .await
            .unwrap();
    }

    assert_eq!(engine.history().len(), 3);
    assert!(engine.history().iter().all(|r| r.status == RunStatus::Success));
}

#[tokio::test]
async fn fn_task_results_flow_downstream() {
    init_tracing();
    let mut graph = DependencyGraph::new("sum");
    graph.add_task(Box::new(FnTask::new("source", |_, _| Ok(json!({ "n": 21 })))));
    graph.add_task(Box::new(FnTask::new("double", |upstream, _| {
        let n = upstream["source"]["n"].as_i64().unwrap_or(0);
        Ok(json!({ "n": n * 2 }))
    })));
    graph.add_dependency("source", "double").unwrap();

    let mut engine = ExecutionEngine::new();
    let results = engine
        .execute(&mut graph, &ParameterStore::new(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(results["double"]["n"], json!(42));
}
