#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end execution tests: routing, the audit ledger, loop termination,
//! failure semantics, and the streaming surface.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};

use tokenflow::{
    AuditEventKind, Error, Invocable, NodeResult, NodeSpec, RunContext, RunEvent, RunOptions,
    RunStatus, RuntimeHandle, WorkloadGraph,
};

fn ingest(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
    let lines = payload["document"].as_str().unwrap_or_default().lines().count();
    runtime.emit("summarize", json!({ "line_count": lines }))?;
    Ok(json!(lines))
}

fn summarize(payload: Value, _runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
    Ok(payload)
}

fn echo(payload: Value, _runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
    Ok(payload)
}

fn looping(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
    let iteration = runtime
        .state()
        .get("iteration")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    runtime.state_mut().set("iteration", json!(iteration + 1));
    if iteration < 2 {
        runtime.emit("loop", payload)?;
    } else {
        runtime.stop();
    }
    Ok(json!(iteration))
}

fn looping_forever(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
    runtime.emit("loop", payload)?;
    Ok(json!("again"))
}

fn document_graph() -> WorkloadGraph {
    let mut graph = WorkloadGraph::new("DocAgent", "1.0.0").with_org_namespace("test-org");
    graph
        .add_node_fn(NodeSpec::new("ingest", "parser"), ingest)
        .unwrap();
    graph
        .add_node_fn(NodeSpec::new("summarize", "analyzer"), summarize)
        .unwrap();
    graph.add_edge("ingest", "summarize").unwrap();
    graph
}

fn loop_graph(node: fn(Value, &mut RuntimeHandle<'_>, &RunContext) -> NodeResult) -> WorkloadGraph {
    let mut graph = WorkloadGraph::new("Looper", "0.1.0").with_org_namespace("test-org");
    graph.add_node_fn(NodeSpec::new("loop", "cycler"), node).unwrap();
    graph.add_edge("loop", "loop").unwrap();
    graph
}

#[tokio::test]
async fn test_linear_execution_and_ledger_order() {
    let app = document_graph().compile().unwrap();
    let report = app
        .execute(json!({"document": "L1\nL2"}), RunOptions::new("dev"))
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(report.node_results("summarize"), vec![&json!({"line_count": 2})]);
    assert_eq!(report.nodes_executed(), vec!["ingest", "summarize"]);

    use AuditEventKind::*;
    assert_eq!(
        report.ledger().kinds(),
        vec![
            TokenEnqueued, // seed for ingest
            TokenDequeued, // ingest
            NodeCompleted, // ingest
            TokenEnqueued, // ingest -> summarize
            TokenDequeued, // summarize
            NodeCompleted, // summarize
        ]
    );

    let events = report.ledger().events();
    assert_eq!(events[0].target.as_deref(), Some("ingest"));
    assert_eq!(events[0].metadata["seed"], json!(true));
    assert_eq!(events[3].source.as_deref(), Some("ingest"));
    assert_eq!(events[3].target.as_deref(), Some("summarize"));
    assert_eq!(events[5].source.as_deref(), Some("summarize"));
}

#[tokio::test]
async fn test_loop_terminates_via_cooperative_stop() {
    let app = loop_graph(looping).compile().unwrap();
    let report = app
        .execute(json!({"payload": 1}), RunOptions::new("qa"))
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::Stopped);
    assert_eq!(
        report.node_results("loop"),
        vec![&json!(0), &json!(1), &json!(2)]
    );

    let stopped: Vec<_> = report
        .ledger()
        .iter()
        .filter(|event| event.kind == AuditEventKind::RunStopped)
        .collect();
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0].metadata["discarded"], json!(0));
}

#[tokio::test]
async fn test_step_limit_preserves_results() {
    let app = loop_graph(looping_forever).compile().unwrap();
    let err = app
        .execute(json!({}), RunOptions::new("qa").with_max_steps(5))
        .await
        .unwrap_err();

    match &err {
        Error::StepLimitExceeded { limit, report } => {
            assert_eq!(*limit, 5);
            assert_eq!(report.status(), RunStatus::Failed);
            assert_eq!(report.node_results("loop").len(), 5);
        }
        other => panic!("expected StepLimitExceeded, got {other:?}"),
    }
    assert!(err.ledger().is_some());
}

#[tokio::test]
async fn test_unknown_route_keeps_ledger_retrievable() {
    fn alpha(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
        runtime.emit("beta", payload.clone())?;
        Ok(payload)
    }
    fn beta(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
        runtime.emit("gamma", payload.clone())?;
        Ok(payload)
    }

    let mut graph = WorkloadGraph::new("InvalidRouting", "0.0.1").with_org_namespace("test-org");
    graph.add_node_fn(NodeSpec::new("alpha", "start"), alpha).unwrap();
    graph.add_node_fn(NodeSpec::new("beta", "next"), beta).unwrap();
    graph.add_edge("alpha", "beta").unwrap();

    let app = graph.compile().unwrap();
    let err = app
        .execute(json!({"value": 1}), RunOptions::new("dev"))
        .await
        .unwrap_err();

    match &err {
        Error::UnknownRoute { origin, target, report } => {
            assert_eq!(origin, "beta");
            assert_eq!(target, "gamma");
            // Alpha's completed work survives the failure.
            assert_eq!(report.node_results("alpha").len(), 1);
            let kinds = report.ledger().kinds();
            assert_eq!(kinds.last(), Some(&AuditEventKind::NodeFailed));
        }
        other => panic!("expected UnknownRoute, got {other:?}"),
    }

    let ledger = err.ledger().unwrap();
    assert!(!ledger.is_empty());
}

#[tokio::test]
async fn test_node_failure_carries_partial_report() {
    fn fine(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
        runtime.emit("broken", payload.clone())?;
        Ok(payload)
    }
    fn broken(_payload: Value, _runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
        Err("boom".into())
    }

    let mut graph = WorkloadGraph::new("Failing", "0.0.1").with_org_namespace("test-org");
    graph.add_node_fn(NodeSpec::new("fine", "start"), fine).unwrap();
    graph.add_node_fn(NodeSpec::new("broken", "end"), broken).unwrap();
    graph.add_edge("fine", "broken").unwrap();

    let err = graph
        .compile()
        .unwrap()
        .execute(json!({}), RunOptions::new("dev"))
        .await
        .unwrap_err();

    match &err {
        Error::NodeFailure { node, source, report } => {
            assert_eq!(node, "broken");
            assert_eq!(source.to_string(), "boom");
            assert_eq!(report.node_results("fine").len(), 1);
            assert!(report.node_results("broken").is_empty());
            let failed = report.ledger().events().last().unwrap();
            assert_eq!(failed.kind, AuditEventKind::NodeFailed);
            assert_eq!(failed.metadata["error"], json!("boom"));
        }
        other => panic!("expected NodeFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_context_and_shared_state_flow() {
    fn source(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
        runtime.emit("count", payload.clone())?;
        Ok(payload)
    }
    fn count(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
        let total = payload["text"].as_str().unwrap_or_default().split_whitespace().count();
        runtime.emit("summary", json!({ "total": total }))?;
        Ok(json!(total))
    }
    fn summary(payload: Value, runtime: &mut RuntimeHandle<'_>, ctx: &RunContext) -> NodeResult {
        let calls = runtime.state().get("calls").and_then(Value::as_u64).unwrap_or(0) + 1;
        runtime.state_mut().set("calls", json!(calls));
        Ok(json!({
            "upstream": payload["total"],
            "deployment": ctx.deployment_id(),
            "caller": ctx.invoked_by(),
            "workload_id": ctx.workload_id(),
            "logic_id": ctx.logic_id().to_hex(),
            "org": ctx.org_namespace(),
            "trigger": ctx.extra("trigger"),
            "call_count": calls,
        }))
    }

    let mut graph = WorkloadGraph::new("Context", "0.0.1").with_org_namespace("context-org");
    graph.add_node_fn(NodeSpec::new("source", "ingest"), source).unwrap();
    graph.add_node_fn(NodeSpec::new("count", "analyzer"), count).unwrap();
    graph.add_node_fn(NodeSpec::new("summary", "writer"), summary).unwrap();
    graph.add_edge("source", "count").unwrap();
    graph.add_edge("count", "summary").unwrap();

    let app = graph.compile().unwrap();
    let report = app
        .execute(
            json!({"text": "hi there"}),
            RunOptions::new("qa")
                .with_invoked_by("ci")
                .with_extra("trigger", json!("cron")),
        )
        .await
        .unwrap();

    let result = report.node_results("summary")[0];
    assert_eq!(result["upstream"], json!(2));
    assert_eq!(result["deployment"], json!("qa"));
    assert_eq!(result["caller"], json!("ci"));
    assert_eq!(result["workload_id"], json!("context:0.0.1"));
    assert_eq!(result["logic_id"], json!(app.logic_id().to_hex()));
    assert_eq!(result["org"], json!("context-org"));
    assert_eq!(result["trigger"], json!("cron"));
    assert_eq!(result["call_count"], json!(1));
    assert_eq!(report.context().deployment_id(), "qa");
}

#[tokio::test]
async fn test_state_is_not_shared_across_runs() {
    let app = loop_graph(looping).compile().unwrap();

    let first = app.execute(json!({}), RunOptions::new("dev")).await.unwrap();
    let second = app.execute(json!({}), RunOptions::new("dev")).await.unwrap();

    // Each run starts its iteration counter from scratch.
    assert_eq!(first.node_results("loop"), second.node_results("loop"));
    assert_ne!(first.context().run_id(), second.context().run_id());
}

struct Increment {
    next: &'static str,
}

#[async_trait]
impl Invocable for Increment {
    async fn invoke(
        &self,
        payload: Value,
        runtime: &mut RuntimeHandle<'_>,
        _context: &RunContext,
    ) -> NodeResult {
        tokio::task::yield_now().await;
        let value = payload["value"].as_i64().unwrap_or(0) + 1;
        runtime.emit(self.next, json!({ "value": value }))?;
        Ok(json!(value))
    }
}

struct Finish;

#[async_trait]
impl Invocable for Finish {
    async fn invoke(
        &self,
        payload: Value,
        _runtime: &mut RuntimeHandle<'_>,
        _context: &RunContext,
    ) -> NodeResult {
        tokio::task::yield_now().await;
        Ok(payload["value"].clone())
    }
}

#[tokio::test]
async fn test_async_invocables_are_awaited() {
    let mut graph = WorkloadGraph::new("Async", "0.0.1").with_org_namespace("test-org");
    graph
        .add_node(NodeSpec::new("first", "starter"), Increment { next: "second" })
        .unwrap();
    graph.add_node(NodeSpec::new("second", "finisher"), Finish).unwrap();
    graph.add_edge("first", "second").unwrap();

    let report = graph
        .compile()
        .unwrap()
        .execute(json!({"value": 1}), RunOptions::new("async"))
        .await
        .unwrap();

    assert_eq!(report.node_results("second"), vec![&json!(2)]);
}

#[tokio::test]
async fn test_custom_events_and_emit_metadata() {
    fn annotate(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
        let mut meta = Map::new();
        meta.insert("tokens".to_string(), json!(3));
        runtime.record_event("llm-call", meta);

        let mut route_meta = Map::new();
        route_meta.insert("priority".to_string(), json!("high"));
        runtime.emit_with_metadata("sink", payload.clone(), route_meta)?;

        // Lineage is visible to the node through its token.
        assert!(runtime.token().lineage().is_empty());
        assert!(runtime.token().parent_id().is_none());
        Ok(payload)
    }
    fn sink(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
        assert_eq!(runtime.token().lineage(), ["annotate".to_string()]);
        assert!(runtime.token().parent_id().is_some());
        Ok(payload)
    }

    let mut graph = WorkloadGraph::new("Annotated", "0.0.1").with_org_namespace("test-org");
    graph.add_node_fn(NodeSpec::new("annotate", "worker"), annotate).unwrap();
    graph.add_node_fn(NodeSpec::new("sink", "collector"), sink).unwrap();
    graph.add_edge("annotate", "sink").unwrap();

    let report = graph
        .compile()
        .unwrap()
        .execute(json!({}), RunOptions::new("dev"))
        .await
        .unwrap();

    let custom: Vec<_> = report
        .ledger()
        .iter()
        .filter(|event| event.kind == AuditEventKind::Custom)
        .collect();
    assert_eq!(custom.len(), 1);
    assert_eq!(custom[0].metadata["event"], json!("llm-call"));
    assert_eq!(custom[0].metadata["tokens"], json!(3));
    assert_eq!(custom[0].source.as_deref(), Some("annotate"));

    let enqueue_to_sink = report
        .ledger()
        .iter()
        .find(|event| {
            event.kind == AuditEventKind::TokenEnqueued
                && event.target.as_deref() == Some("sink")
        })
        .unwrap();
    assert_eq!(enqueue_to_sink.metadata["priority"], json!("high"));
}

#[tokio::test]
async fn test_entry_override_and_validation() {
    let app = document_graph().compile().unwrap();

    // Seeding summarize directly skips ingest entirely.
    let report = app
        .execute(
            json!({"line_count": 9}),
            RunOptions::new("dev").with_entry_nodes(["summarize"]),
        )
        .await
        .unwrap();
    assert!(report.node_results("ingest").is_empty());
    assert_eq!(report.node_results("summarize"), vec![&json!({"line_count": 9})]);

    let err = app
        .execute(json!({}), RunOptions::new("dev").with_entry_nodes(["ghost"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidEntryNode { name } if name == "ghost"));
}

#[tokio::test]
async fn test_empty_deployment_id_is_rejected() {
    let app = document_graph().compile().unwrap();
    let err = app.execute(json!({}), RunOptions::new("")).await.unwrap_err();
    assert!(matches!(err, Error::MissingDeploymentId));
}

#[test]
fn test_execute_blocking() {
    let app = document_graph().compile().unwrap();
    let report = app
        .execute_blocking(json!({"document": "only line"}), RunOptions::new("dev"))
        .unwrap();
    assert_eq!(report.node_results("summarize"), vec![&json!({"line_count": 1})]);
}

#[tokio::test]
async fn test_streaming_yields_incremental_events() {
    let app = document_graph().compile().unwrap();
    let events: Vec<RunEvent> = app
        .stream(json!({"document": "L1\nL2"}), RunOptions::new("dev"))
        .map(|event| event.unwrap())
        .collect()
        .await;

    let kinds: Vec<_> = events.iter().filter_map(RunEvent::kind).collect();
    assert!(kinds.contains(&AuditEventKind::TokenDequeued));
    assert!(kinds.contains(&AuditEventKind::NodeCompleted));

    let last = events.last().unwrap();
    assert!(last.is_finished());
    match last {
        RunEvent::Finished(report) => {
            assert_eq!(report.status(), RunStatus::Completed);
            assert_eq!(report.node_results("summarize"), vec![&json!({"line_count": 2})]);
            // The streamed events are exactly the ledger, in order.
            assert_eq!(events.len(), report.ledger().len() + 1);
        }
        RunEvent::Audit(_) => panic!("stream must end with Finished"),
    }
}

#[tokio::test]
async fn test_streaming_surfaces_failure_after_audit_events() {
    let app = loop_graph(looping_forever).compile().unwrap();
    let mut audit_count = 0;
    let mut failure = None;

    let mut events = std::pin::pin!(app.stream(json!({}), RunOptions::new("dev").with_max_steps(2)));
    while let Some(event) = events.next().await {
        match event {
            Ok(RunEvent::Audit(_)) => audit_count += 1,
            Ok(RunEvent::Finished(_)) => panic!("run must not finish cleanly"),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    let err = failure.expect("stream must surface the failure");
    assert!(matches!(err, Error::StepLimitExceeded { limit: 2, .. }));
    // Everything the ledger recorded was streamed before the error.
    assert_eq!(audit_count, err.ledger().unwrap().len());
}
