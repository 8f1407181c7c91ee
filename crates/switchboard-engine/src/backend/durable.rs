use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use switchboard_core::error::Result;
use switchboard_core::types::RunId;

use crate::runner::{StepExecution, UnitRunner};

use super::queue::ActivityQueue;
use super::state::RunStateStore;
use super::worker::WorkerPool;
use super::{ActivityRequest, Backend};

/// Durable execution: activities are dispatched to named queues drained by
/// a worker pool, each bounded by its start-to-close timeout, and every
/// completed step is recorded in the run-state store before the loop
/// advances.
///
/// Re-executing a run with the same id replays recorded step results
/// instead of re-dispatching, so a crashed run resumes at the last
/// completed step rather than repeating it.
pub struct DurableBackend {
    store: Arc<RunStateStore>,
    runner: Arc<UnitRunner>,
    workers_per_queue: usize,
    cancel: CancellationToken,
    queues: Mutex<HashMap<String, (ActivityQueue, WorkerPool)>>,
}

impl DurableBackend {
    pub fn new(
        store: Arc<RunStateStore>,
        runner: Arc<UnitRunner>,
        workers_per_queue: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            runner,
            workers_per_queue: workers_per_queue.max(1),
            cancel,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// The run-state store backing this backend.
    pub fn store(&self) -> Arc<RunStateStore> {
        Arc::clone(&self.store)
    }

    /// Submit an activity to the named queue, starting its worker pool on
    /// first use.
    async fn submit(&self, queue_name: &str, req: &ActivityRequest) -> Result<StepExecution> {
        // Clone the queue handle out of the map so a slow activity doesn't
        // hold the lock and block other queues.
        let queue = {
            let mut queues = self.queues.lock().await;
            queues
                .entry(queue_name.to_string())
                .or_insert_with(|| {
                    info!(
                        queue = %queue_name,
                        workers = self.workers_per_queue,
                        "Starting activity queue"
                    );
                    let (queue, rx) = ActivityQueue::new(64);
                    let pool = WorkerPool::spawn(
                        queue_name,
                        rx,
                        Arc::clone(&self.runner),
                        self.workers_per_queue,
                        self.cancel.clone(),
                    );
                    (queue, pool)
                })
                .0
                .clone()
        };

        queue
            .submit(
                req.def.clone(),
                req.inputs.clone(),
                req.activity.start_to_close_timeout_secs,
            )
            .await
    }
}

impl Backend for DurableBackend {
    fn execute(&self, req: ActivityRequest) -> BoxFuture<'_, Result<StepExecution>> {
        Box::pin(async move {
            // Replay: a recorded result short-circuits re-dispatch.
            if let Some(exec) = self.store.load_step(&req.run_id, req.step)? {
                debug!(
                    run_id = %req.run_id,
                    step = req.step,
                    agent = %req.def.name,
                    "Replaying recorded step result"
                );
                return Ok(exec);
            }

            let exec = self.submit(&req.activity.queue, &req).await?;

            // Durably record the result before the loop advances.
            self.store
                .save_step(&req.run_id, req.step, &req.def.name, &exec)?;
            Ok(exec)
        })
    }

    fn checkpoint(
        &self,
        run_id: &RunId,
        current_agent: &str,
        next_step: usize,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        self.store
            .save_control(run_id, current_agent, next_step, variables)
    }
}
