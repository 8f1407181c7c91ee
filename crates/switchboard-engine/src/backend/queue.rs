use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::types::AgentDefinition;

use crate::runner::StepExecution;

/// An activity queued for a worker pool.
pub struct ActivityItem {
    pub def: AgentDefinition,
    pub inputs: HashMap<String, serde_json::Value>,
    pub timeout_secs: u64,
    pub respond: oneshot::Sender<Result<StepExecution>>,
}

/// A named FIFO activity queue.
///
/// Submitters enqueue one unit of work and await its result over a oneshot
/// reply channel. Dropping the submit future before the reply arrives
/// discards the result; an already-dispatched activity may still complete.
#[derive(Clone)]
pub struct ActivityQueue {
    tx: mpsc::Sender<ActivityItem>,
}

impl ActivityQueue {
    /// Create a new queue and return (queue_handle, receiver).
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ActivityItem>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Enqueue an activity and wait for the worker's result.
    pub async fn submit(
        &self,
        def: AgentDefinition,
        inputs: HashMap<String, serde_json::Value>,
        timeout_secs: u64,
    ) -> Result<StepExecution> {
        let (respond, rx) = oneshot::channel();
        let item = ActivityItem {
            def,
            inputs,
            timeout_secs,
            respond,
        };
        self.tx
            .send(item)
            .await
            .map_err(|_| SwitchboardError::State("activity queue closed".into()))?;
        rx.await
            .map_err(|_| SwitchboardError::State("worker dropped the activity".into()))?
    }
}
