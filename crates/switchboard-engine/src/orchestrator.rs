use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchboard_core::config::EngineConfig;
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::event::{EventBus, RunEvent};
use switchboard_core::traits::{Evaluator, Registry, RunHook};
use switchboard_core::types::{AgentDefinition, RunId, RunRecord};

use crate::backend::{
    ActivityRequest, Backend, DurableBackend, LocalBackend, RunStateStore,
};
use crate::context::ExecutionContext;
use crate::handoff::{apply_handoff, select_next};
use crate::runner::{backoff_delay, is_retryable, resolve_inputs, StepExecution, UnitRunner};

/// A completed orchestration run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// The last agent's outputs.
    pub output: HashMap<String, serde_json::Value>,
    /// Final context variables.
    pub variables: HashMap<String, serde_json::Value>,
    /// One record per successful agent execution, in order.
    pub history: Vec<RunRecord>,
    /// Number of agent executions.
    pub hops: usize,
}

/// A failed orchestration run: the error plus the partial history
/// accumulated up to the failure point.
#[derive(Debug)]
pub struct RunFailure {
    pub error: SwitchboardError,
    pub variables: HashMap<String, serde_json::Value>,
    pub history: Vec<RunRecord>,
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run failed after {} completed steps: {}",
            self.history.len(),
            self.error
        )
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Drives the orchestration state machine:
/// IDLE -> RUNNING(agent) -> (ROUTING -> RUNNING(next))* -> COMPLETED | FAILED.
///
/// The registry is an explicit handle (no ambient global), the backend is
/// selected once per orchestrator, and the context is exclusively owned by
/// each run. Cancellation is checked at the top of every iteration and at
/// the two suspension points (unit-of-work call, router call).
pub struct Orchestrator {
    registry: Arc<dyn Registry>,
    backend: Arc<dyn Backend>,
    config: EngineConfig,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator over an already-built backend.
    pub fn new(registry: Arc<dyn Registry>, backend: Arc<dyn Backend>, config: EngineConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_capacity));
        Self {
            registry,
            backend,
            config,
            event_bus,
            cancel: CancellationToken::new(),
        }
    }

    /// Orchestrator with the Local backend: units of work run in-process on
    /// the caller's task.
    pub fn local(
        registry: Arc<dyn Registry>,
        evaluator: Arc<dyn Evaluator>,
        hooks: Vec<Arc<dyn RunHook>>,
        config: EngineConfig,
    ) -> Self {
        let runner = Arc::new(
            UnitRunner::new(evaluator, Arc::clone(&registry)).with_hooks(hooks),
        );
        Self::new(registry, Arc::new(LocalBackend::new(runner)), config)
    }

    /// Orchestrator with the Durable backend: units of work are dispatched
    /// to named queues and every completed step is recorded in the state
    /// store at `state_path` before the loop advances.
    pub fn durable(
        registry: Arc<dyn Registry>,
        evaluator: Arc<dyn Evaluator>,
        hooks: Vec<Arc<dyn RunHook>>,
        config: EngineConfig,
        state_path: &Path,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let runner = Arc::new(
            UnitRunner::new(evaluator, Arc::clone(&registry)).with_hooks(hooks),
        );
        let store = Arc::new(RunStateStore::open(state_path)?);
        let backend = Arc::new(DurableBackend::new(
            store,
            runner,
            config.workers,
            cancel.clone(),
        ));
        let event_bus = Arc::new(EventBus::new(config.event_capacity));
        Ok(Self {
            registry,
            backend,
            config,
            event_bus,
            cancel,
        })
    }

    /// Token cancelling this orchestrator's runs. Cancellation is observed
    /// at suspension points; in-flight activities are discarded, not killed.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bus broadcasting run lifecycle events.
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Run to completion starting from `start_agent` with a fresh run id.
    pub async fn run(
        &self,
        start_agent: &str,
        input: HashMap<String, serde_json::Value>,
    ) -> std::result::Result<RunOutcome, RunFailure> {
        self.run_with_id(RunId::new(), start_agent, input).await
    }

    /// Run with an explicit run id.
    ///
    /// Under the Durable backend, re-executing a crashed run with its
    /// original id replays recorded step results and resumes at the last
    /// completed step.
    pub async fn run_with_id(
        &self,
        run_id: RunId,
        start_agent: &str,
        input: HashMap<String, serde_json::Value>,
    ) -> std::result::Result<RunOutcome, RunFailure> {
        self.run_with_context(run_id, start_agent, ExecutionContext::from_map(input))
            .await
    }

    /// Run over a caller-supplied context (e.g. one restored by an external
    /// serializer). The context is exclusively owned by this run from here
    /// on and is returned, with its history, in the outcome or failure.
    pub async fn run_with_context(
        &self,
        run_id: RunId,
        start_agent: &str,
        mut ctx: ExecutionContext,
    ) -> std::result::Result<RunOutcome, RunFailure> {
        match self.drive(&run_id, start_agent, &mut ctx).await {
            Ok((output, hops)) => {
                info!(run_id = %run_id, hops, "Run completed");
                self.event_bus.publish(RunEvent::RunCompleted {
                    run_id: run_id.clone(),
                    steps: hops,
                });
                let (variables, history) = ctx.into_parts();
                Ok(RunOutcome {
                    run_id,
                    output,
                    variables,
                    history,
                    hops,
                })
            }
            Err(err) => {
                error!(run_id = %run_id, error = %err, "Run failed");
                self.event_bus.publish(RunEvent::RunFailed {
                    run_id,
                    error: err.to_string(),
                });
                let (variables, history) = ctx.into_parts();
                Err(RunFailure {
                    error: err,
                    variables,
                    history,
                })
            }
        }
    }

    /// Blocking variant of [`run`](Self::run), for callers without a
    /// runtime. Builds a current-thread tokio runtime per call.
    pub fn run_blocking(
        &self,
        start_agent: &str,
        input: HashMap<String, serde_json::Value>,
    ) -> std::result::Result<RunOutcome, RunFailure> {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                return Err(RunFailure {
                    error: SwitchboardError::Io(e),
                    variables: HashMap::new(),
                    history: Vec::new(),
                })
            }
        };
        rt.block_on(self.run(start_agent, input))
    }

    /// The loop proper. Appends to `ctx` as it goes so a failure surfaces
    /// the partial history.
    async fn drive(
        &self,
        run_id: &RunId,
        start_agent: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<(HashMap<String, serde_json::Value>, usize)> {
        let mut current = self
            .registry
            .get_agent(start_agent)
            .ok_or_else(|| SwitchboardError::AgentNotFound(start_agent.to_string()))?;

        info!(run_id = %run_id, agent = %current.name, "Run started");
        self.event_bus.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
            agent: current.name.clone(),
        });

        let mut hops = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SwitchboardError::Cancelled);
            }
            if hops >= self.config.max_hops {
                warn!(run_id = %run_id, max_hops = self.config.max_hops, "Hop limit reached");
                return Err(SwitchboardError::MaxHopsExceeded(self.config.max_hops));
            }

            // RUNNING: resolve declared inputs, execute the unit of work.
            let inputs = resolve_inputs(&current, ctx.variables())?;
            let exec = self
                .execute_with_retry(run_id, hops, &current, inputs)
                .await?;

            ctx.append(RunRecord {
                agent_name: current.name.clone(),
                timestamp: Utc::now(),
                inputs: exec.inputs.clone(),
                outputs: exec.outputs.clone(),
            });
            hops += 1;

            // Control state is durably recorded before the loop advances.
            self.backend
                .checkpoint(run_id, &current.name, hops, ctx.variables())?;

            debug!(run_id = %run_id, agent = %current.name, step = hops - 1, "Step completed");
            self.event_bus.publish(RunEvent::StepCompleted {
                run_id: run_id.clone(),
                agent: current.name.clone(),
                step: hops - 1,
            });

            // ROUTING: a terminal agent completes the run.
            let Some(router) = &current.router else {
                return Ok((exec.outputs, hops));
            };

            let routed = tokio::select! {
                routed = router.route(&current.name, &exec.outputs, ctx.variables()) => routed,
                _ = self.cancel.cancelled() => return Err(SwitchboardError::Cancelled),
            }
            .map_err(|e| match e {
                routing @ SwitchboardError::Routing { .. } => routing,
                other => SwitchboardError::Routing {
                    agent: current.name.clone(),
                    message: other.to_string(),
                },
            })?;

            let Some(request) = routed else {
                return Ok((exec.outputs, hops));
            };

            let Some(next) = select_next(&request, self.registry.as_ref())? else {
                return Ok((exec.outputs, hops));
            };

            info!(run_id = %run_id, from = %current.name, to = %next.name, "Handoff");
            self.event_bus.publish(RunEvent::HandoffRouted {
                run_id: run_id.clone(),
                from: current.name.clone(),
                to: next.name.clone(),
            });

            apply_handoff(&request, &current, &exec.outputs, ctx);
            current = next;
        }
    }

    /// Execute one agent with retry semantics scoped to this step.
    async fn execute_with_retry(
        &self,
        run_id: &RunId,
        step: usize,
        def: &AgentDefinition,
        inputs: HashMap<String, serde_json::Value>,
    ) -> Result<StepExecution> {
        // Resolution precedence: agent-specific > run-wide default > built-in.
        let policy = def
            .retry
            .clone()
            .or_else(|| def.activity.as_ref().and_then(|a| a.retry.clone()))
            .or_else(|| self.config.retry.clone())
            .unwrap_or_default();
        let activity = def
            .activity
            .clone()
            .or_else(|| self.config.activity.clone())
            .unwrap_or_default();

        let mut attempt = 1u32;
        loop {
            let req = ActivityRequest {
                run_id: run_id.clone(),
                step,
                def: def.clone(),
                inputs: inputs.clone(),
                activity: activity.clone(),
            };

            let result = tokio::select! {
                result = self.backend.execute(req) => result,
                _ = self.cancel.cancelled() => Err(SwitchboardError::Cancelled),
            };

            match result {
                Ok(exec) => return Ok(exec),
                Err(e) if !is_retryable(&e, &policy) => return Err(e),
                Err(e) if attempt >= policy.max_attempts => {
                    return Err(SwitchboardError::RetryExhausted {
                        agent: def.name.clone(),
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
                Err(e) => {
                    let backoff = backoff_delay(attempt, &policy);
                    warn!(
                        agent = %def.name,
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying unit of work"
                    );
                    self.event_bus.publish(RunEvent::RetryScheduled {
                        run_id: run_id.clone(),
                        agent: def.name.clone(),
                        attempt,
                        backoff_ms: backoff.as_millis() as u64,
                    });
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.cancel.cancelled() => return Err(SwitchboardError::Cancelled),
                    }
                    attempt += 1;
                }
            }
        }
    }
}
