use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{Result, SwitchboardError};
use crate::types::{AgentDefinition, ScoredCandidate};

/// Evaluator: produces an agent's outputs from its resolved inputs.
///
/// The engine treats this as an opaque, possibly-slow, possibly-retryable
/// call. Failures should be reported as `SwitchboardError::Evaluation` with
/// a `kind` the retry policy can classify.
pub trait Evaluator: Send + Sync + 'static {
    fn evaluate<'a>(
        &'a self,
        def: &'a AgentDefinition,
        inputs: &'a HashMap<String, serde_json::Value>,
        tools: &'a [Arc<dyn ToolFn>],
    ) -> BoxFuture<'a, Result<HashMap<String, serde_json::Value>>>;
}

/// Registry: name to definition/callable lookup.
///
/// Read-only from the loop's perspective: registration happens before any
/// run starts. Passed explicitly into the orchestrator; there is no ambient
/// global registry.
pub trait Registry: Send + Sync + 'static {
    fn get_agent(&self, name: &str) -> Option<AgentDefinition>;

    fn get_tool(&self, name: &str) -> Option<Arc<dyn ToolFn>>;
}

/// A callable tool passed through to the evaluator.
pub trait ToolFn: Send + Sync + 'static {
    /// Tool name (as referenced by agent definitions).
    fn name(&self) -> &str;

    /// Invoke the tool.
    fn call(&self, input: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Module hook invoked around each unit-of-work execution.
///
/// Hooks run in registration order; a hook's mutation of inputs/outputs is
/// visible to the next hook and to the recorded RunRecord.
pub trait RunHook: Send + Sync + 'static {
    fn before_run<'a>(
        &'a self,
        agent: &'a AgentDefinition,
        inputs: &'a mut HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<()>> {
        let _ = (agent, inputs);
        Box::pin(async { Ok(()) })
    }

    fn after_run<'a>(
        &'a self,
        agent: &'a AgentDefinition,
        inputs: &'a HashMap<String, serde_json::Value>,
        outputs: &'a mut HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<()>> {
        let _ = (agent, inputs, outputs);
        Box::pin(async { Ok(()) })
    }

    fn on_error<'a>(
        &'a self,
        agent: &'a AgentDefinition,
        error: &'a SwitchboardError,
        inputs: &'a HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, ()> {
        let _ = (agent, error, inputs);
        Box::pin(async {})
    }
}

/// Scoring collaborator for the Scored router variant.
///
/// Returns candidate agents with confidence scores; the engine picks the
/// best candidate and enforces the threshold uniformly across policies.
pub trait HandoffScorer: Send + Sync + 'static {
    fn score<'a>(
        &'a self,
        current_agent: &'a str,
        result: &'a HashMap<String, serde_json::Value>,
        variables: &'a HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<Vec<ScoredCandidate>>>;
}
