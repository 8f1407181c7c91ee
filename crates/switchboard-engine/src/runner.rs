use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use switchboard_core::config::RetryPolicy;
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::{Evaluator, Registry, RunHook, ToolFn};
use switchboard_core::types::AgentDefinition;

/// Inputs and outputs of one successful agent execution, as recorded after
/// hooks ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub inputs: HashMap<String, serde_json::Value>,
    pub outputs: HashMap<String, serde_json::Value>,
}

/// Executes one agent's declared lifecycle: hooks, evaluator, hooks.
///
/// Output production is delegated to the external `Evaluator` collaborator;
/// the runner owns hook ordering and the input/output snapshots that end up
/// in the RunRecord.
pub struct UnitRunner {
    evaluator: Arc<dyn Evaluator>,
    registry: Arc<dyn Registry>,
    hooks: Vec<Arc<dyn RunHook>>,
}

impl UnitRunner {
    pub fn new(evaluator: Arc<dyn Evaluator>, registry: Arc<dyn Registry>) -> Self {
        Self {
            evaluator,
            registry,
            hooks: Vec::new(),
        }
    }

    /// Set the module hooks, invoked in registration order.
    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn RunHook>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Run the agent once with already-resolved inputs.
    ///
    /// Hook mutations of inputs/outputs are visible to the next hook, to the
    /// evaluator, and to the returned snapshots. A hook or evaluator error
    /// fails the attempt; `on_error` hooks observe it before it propagates.
    pub async fn run_once(
        &self,
        def: &AgentDefinition,
        inputs: HashMap<String, serde_json::Value>,
    ) -> Result<StepExecution> {
        let mut inputs = inputs;
        for hook in &self.hooks {
            hook.before_run(def, &mut inputs).await?;
        }

        let tools = self.resolve_tools(def);
        debug!(agent = %def.name, tools = tools.len(), "Invoking evaluator");

        match self.evaluator.evaluate(def, &inputs, &tools).await {
            Ok(mut outputs) => {
                for hook in &self.hooks {
                    hook.after_run(def, &inputs, &mut outputs).await?;
                }
                Ok(StepExecution { inputs, outputs })
            }
            Err(e) => {
                for hook in &self.hooks {
                    hook.on_error(def, &e, &inputs).await;
                }
                Err(e)
            }
        }
    }

    fn resolve_tools(&self, def: &AgentDefinition) -> Vec<Arc<dyn ToolFn>> {
        def.tools
            .iter()
            .filter_map(|name| {
                let tool = self.registry.get_tool(name);
                if tool.is_none() {
                    warn!(agent = %def.name, tool = %name, "Tool not found in registry, skipping");
                }
                tool
            })
            .collect()
    }
}

/// Resolve an agent's declared inputs from the run's variables.
///
/// Each declared key resolves to the context variable of the same name, or
/// to the field's default. A required key with neither fails the run; it
/// never silently defaults to null.
pub fn resolve_inputs(
    def: &AgentDefinition,
    variables: &HashMap<String, serde_json::Value>,
) -> Result<HashMap<String, serde_json::Value>> {
    let mut inputs = HashMap::new();
    for field in &def.input_spec {
        if let Some(value) = variables.get(&field.key) {
            inputs.insert(field.key.clone(), value.clone());
        } else if let Some(default) = &field.default {
            inputs.insert(field.key.clone(), default.clone());
        } else {
            return Err(SwitchboardError::InputResolution {
                agent: def.name.clone(),
                key: field.key.clone(),
            });
        }
    }
    Ok(inputs)
}

/// Whether a step failure may be retried under the given policy.
///
/// Only evaluation failures and activity timeouts are retryable to begin
/// with; a kind listed in `non_retryable_kinds` fails immediately.
pub fn is_retryable(error: &SwitchboardError, policy: &RetryPolicy) -> bool {
    if policy.non_retryable_kinds.contains(error.kind()) {
        return false;
    }
    matches!(
        error,
        SwitchboardError::Evaluation { .. } | SwitchboardError::ActivityTimeout { .. }
    )
}

/// Backoff before retrying after the given 1-based failed attempt:
/// `initial * multiplier^(attempt-1)` capped at `max_backoff`, with
/// 0.8x-1.2x jitter.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exp = policy
        .backoff_multiplier
        .powi(attempt.saturating_sub(1) as i32);
    let ms = (policy.initial_backoff_ms as f64 * exp).min(policy.max_backoff_ms as f64);
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms * jitter) as u64)
}
