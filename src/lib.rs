//! Switchboard: an agent orchestration engine.
//!
//! Given a named unit of work (an "agent") with declared inputs and
//! outputs, the engine executes it, asks a pluggable routing policy whether
//! another agent should run next, propagates data and shared state between
//! agents, and repeats until no further handoff is produced. Behavior is
//! identical whether units of work run in-process ([`LocalBackend`]) or
//! through the durable, retryable dispatch backend ([`DurableBackend`]).

pub use switchboard_core::config::{ActivityConfig, EngineConfig, RetryPolicy};
pub use switchboard_core::error::{Result, SwitchboardError};
pub use switchboard_core::event::{EventBus, RunEvent};
pub use switchboard_core::router::{ConditionalArm, Router};
pub use switchboard_core::traits::{Evaluator, HandoffScorer, Registry, RunHook, ToolFn};
pub use switchboard_core::types::{
    AgentDefinition, FieldSpec, HandoffMode, HandoffRequest, RunId, RunRecord, ScoredCandidate,
    PREVIOUS_AGENT_OUTPUT,
};

pub use switchboard_engine::backend::{Backend, DurableBackend, LocalBackend, RunStateStore};
pub use switchboard_engine::context::ExecutionContext;
pub use switchboard_engine::orchestrator::{Orchestrator, RunFailure, RunOutcome};
pub use switchboard_engine::registry::InMemoryRegistry;
pub use switchboard_engine::runner::{StepExecution, UnitRunner};
