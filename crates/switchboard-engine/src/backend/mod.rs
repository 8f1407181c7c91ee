use std::collections::HashMap;

use futures::future::BoxFuture;

use switchboard_core::config::ActivityConfig;
use switchboard_core::error::Result;
use switchboard_core::types::{AgentDefinition, RunId};

use crate::runner::StepExecution;

pub mod durable;
pub mod local;
pub mod queue;
pub mod state;
pub mod worker;

pub use durable::DurableBackend;
pub use local::LocalBackend;
pub use queue::{ActivityItem, ActivityQueue};
pub use state::{ControlState, RunStateStore};
pub use worker::WorkerPool;

/// One agent execution handed to a backend.
#[derive(Debug, Clone)]
pub struct ActivityRequest {
    pub run_id: RunId,
    /// Zero-based step index within the run.
    pub step: usize,
    pub def: AgentDefinition,
    /// Resolved inputs (context resolution happens in the loop, not here).
    pub inputs: HashMap<String, serde_json::Value>,
    /// Resolved activity config (agent override or run-wide default).
    pub activity: ActivityConfig,
}

/// Execution strategy for one unit of work, selected once per run.
///
/// Local and Durable implementations must produce identical results for the
/// same agent graph and inputs; only latency and fault tolerance differ.
pub trait Backend: Send + Sync + 'static {
    fn execute(&self, req: ActivityRequest) -> BoxFuture<'_, Result<StepExecution>>;

    /// Durably record the loop's control state before it advances.
    /// No-op for backends without durability.
    fn checkpoint(
        &self,
        run_id: &RunId,
        current_agent: &str,
        next_step: usize,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let _ = (run_id, current_agent, next_step, variables);
        Ok(())
    }
}
