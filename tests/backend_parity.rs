//! Local and Durable backends must produce identical results for the same
//! agent graph and inputs; durable runs additionally replay on resume.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures::future::BoxFuture;

use switchboard::{
    ActivityConfig, AgentDefinition, EngineConfig, Evaluator, FieldSpec, InMemoryRegistry,
    Orchestrator, Result, RetryPolicy, Router, RunId, RunOutcome, ToolFn,
};
use switchboard_test_utils::{ScriptedEvaluator, ScriptedOutcome, StaticEvaluator};

fn vars(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn pipeline_registry() -> Arc<InMemoryRegistry> {
    let mut registry = InMemoryRegistry::new();
    registry.register(
        AgentDefinition::new("research")
            .with_inputs(vec![FieldSpec::required("topic")])
            .with_outputs(vec![FieldSpec::required("findings")])
            .with_router(Router::to("write")),
    );
    registry.register(
        AgentDefinition::new("write")
            .with_inputs(vec![FieldSpec::required("findings")])
            .with_outputs(vec![FieldSpec::required("article")]),
    );
    Arc::new(registry)
}

fn pipeline_evaluator() -> Arc<StaticEvaluator> {
    Arc::new(
        StaticEvaluator::new()
            .agent_outputs(
                "research",
                vars(&[("findings", serde_json::json!("three sources"))]),
            )
            .agent_outputs(
                "write",
                vars(&[("article", serde_json::json!("final draft"))]),
            ),
    )
}

/// History content comparison, timestamps excepted.
fn assert_same_run(a: &RunOutcome, b: &RunOutcome) {
    assert_eq!(a.output, b.output);
    assert_eq!(a.variables, b.variables);
    assert_eq!(a.hops, b.hops);
    assert_eq!(a.history.len(), b.history.len());
    for (ra, rb) in a.history.iter().zip(b.history.iter()) {
        assert_eq!(ra.agent_name, rb.agent_name);
        assert_eq!(ra.inputs, rb.inputs);
        assert_eq!(ra.outputs, rb.outputs);
    }
}

#[tokio::test]
async fn local_and_durable_produce_identical_runs() {
    switchboard_test_utils::init_test_tracing();
    let input = vars(&[("topic", serde_json::json!("orchestration"))]);

    let local = Orchestrator::local(
        pipeline_registry(),
        pipeline_evaluator(),
        vec![],
        EngineConfig::default(),
    );
    let local_outcome = local.run("research", input.clone()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let durable = Orchestrator::durable(
        pipeline_registry(),
        pipeline_evaluator(),
        vec![],
        EngineConfig::default(),
        &dir.path().join("runs.db"),
    )
    .unwrap();
    let durable_outcome = durable.run("research", input).await.unwrap();

    assert_same_run(&local_outcome, &durable_outcome);
}

#[tokio::test]
async fn durable_rerun_replays_recorded_steps() {
    // The script covers exactly one pass through the pipeline; a replayed
    // step that re-dispatched would exhaust it and panic.
    let evaluator = Arc::new(ScriptedEvaluator::new(vec![
        ScriptedOutcome::Ok(vars(&[("findings", serde_json::json!("three sources"))])),
        ScriptedOutcome::Ok(vars(&[("article", serde_json::json!("final draft"))])),
    ]));

    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::durable(
        pipeline_registry(),
        evaluator.clone(),
        vec![],
        EngineConfig::default(),
        &dir.path().join("runs.db"),
    )
    .unwrap();

    let run_id = RunId::new();
    let input = vars(&[("topic", serde_json::json!("orchestration"))]);

    let first = orchestrator
        .run_with_id(run_id.clone(), "research", input.clone())
        .await
        .unwrap();
    assert_eq!(evaluator.calls(), 2);

    // Re-executing the same run id replays both steps from the store.
    let second = orchestrator
        .run_with_id(run_id, "research", input)
        .await
        .unwrap();
    assert_eq!(evaluator.calls(), 2);
    assert_same_run(&first, &second);
}

/// Evaluator that hangs on its first call and succeeds afterwards.
struct HangsOnce {
    calls: AtomicU32,
    outputs: HashMap<String, serde_json::Value>,
}

impl Evaluator for HangsOnce {
    fn evaluate<'a>(
        &'a self,
        _def: &'a AgentDefinition,
        _inputs: &'a HashMap<String, serde_json::Value>,
        _tools: &'a [Arc<dyn ToolFn>],
    ) -> BoxFuture<'a, Result<HashMap<String, serde_json::Value>>> {
        Box::pin(async move {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                futures::future::pending::<()>().await;
            }
            Ok(self.outputs.clone())
        })
    }
}

#[tokio::test]
async fn activity_timeout_is_retried() {
    let mut registry = InMemoryRegistry::new();
    registry.register(
        AgentDefinition::new("slow")
            .with_activity(ActivityConfig::on_queue("slow-lane").with_timeout_secs(1))
            .with_retry(RetryPolicy {
                max_attempts: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
                ..Default::default()
            }),
    );

    let evaluator = Arc::new(HangsOnce {
        calls: AtomicU32::new(0),
        outputs: vars(&[("ok", serde_json::json!(true))]),
    });

    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::durable(
        Arc::new(registry),
        evaluator.clone(),
        vec![],
        EngineConfig::default(),
        &dir.path().join("runs.db"),
    )
    .unwrap();

    let outcome = orchestrator.run("slow", HashMap::new()).await.unwrap();

    // First dispatch timed out, second succeeded.
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.output["ok"], serde_json::json!(true));
    assert_eq!(outcome.history.len(), 1);
}
