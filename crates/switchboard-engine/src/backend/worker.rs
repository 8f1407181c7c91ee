use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchboard_core::error::SwitchboardError;

use crate::runner::UnitRunner;

use super::queue::ActivityItem;

/// Worker tasks draining one named activity queue.
///
/// Each worker pulls an item, runs the unit of work bounded by the item's
/// start-to-close timeout, and reports the result over the item's reply
/// channel. A dropped reply receiver means the run moved on (cancellation);
/// the result is discarded.
pub struct WorkerPool {
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks draining `rx` until the queue closes or the
    /// token is cancelled.
    pub fn spawn(
        queue_name: &str,
        rx: mpsc::Receiver<ActivityItem>,
        runner: Arc<UnitRunner>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let runner = Arc::clone(&runner);
            let cancel = cancel.clone();
            let queue = queue_name.to_string();

            handles.push(tokio::spawn(async move {
                info!(queue = %queue, worker_id, "Worker started");
                loop {
                    let item = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            item = rx.recv() => match item {
                                Some(item) => item,
                                None => break,
                            },
                        }
                    };

                    let agent = item.def.name.clone();
                    let timeout = Duration::from_secs(item.timeout_secs);
                    debug!(queue = %queue, worker_id, agent = %agent, "Worker picked up activity");

                    let result =
                        match tokio::time::timeout(timeout, runner.run_once(&item.def, item.inputs))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => {
                                warn!(
                                    queue = %queue,
                                    agent = %agent,
                                    timeout_secs = item.timeout_secs,
                                    "Activity exceeded start-to-close timeout"
                                );
                                Err(SwitchboardError::ActivityTimeout {
                                    agent,
                                    timeout_secs: item.timeout_secs,
                                })
                            }
                        };

                    // Receiver gone means the run was cancelled; discard.
                    let _ = item.respond.send(result);
                }
                debug!(queue = %queue, worker_id, "Worker stopped");
            }));
        }

        Self { handles }
    }

    /// Number of spawned worker tasks.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use futures::future::BoxFuture;

    use switchboard_core::error::Result;
    use switchboard_core::traits::{Evaluator, ToolFn};
    use switchboard_core::types::AgentDefinition;
    use switchboard_test_utils::StaticEvaluator;

    use crate::backend::queue::ActivityQueue;
    use crate::registry::InMemoryRegistry;

    fn runner(evaluator: Arc<dyn Evaluator>) -> Arc<UnitRunner> {
        Arc::new(UnitRunner::new(evaluator, Arc::new(InMemoryRegistry::new())))
    }

    /// Evaluator that never finishes, for timeout tests.
    struct HangingEvaluator;

    impl Evaluator for HangingEvaluator {
        fn evaluate<'a>(
            &'a self,
            _def: &'a AgentDefinition,
            _inputs: &'a HashMap<String, serde_json::Value>,
            _tools: &'a [Arc<dyn ToolFn>],
        ) -> BoxFuture<'a, Result<HashMap<String, serde_json::Value>>> {
            Box::pin(async move {
                futures::future::pending::<()>().await;
                unreachable!()
            })
        }
    }

    #[tokio::test]
    async fn test_workers_drain_queue() {
        let (queue, rx) = ActivityQueue::new(8);
        let mut outputs = HashMap::new();
        outputs.insert("ok".to_string(), serde_json::json!(1));
        let evaluator = Arc::new(StaticEvaluator::new().agent_outputs("a", outputs));

        let pool = WorkerPool::spawn("q", rx, runner(evaluator), 2, CancellationToken::new());
        assert_eq!(pool.len(), 2);

        let exec = queue
            .submit(AgentDefinition::new("a"), HashMap::new(), 30)
            .await
            .unwrap();
        assert_eq!(exec.outputs["ok"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn test_timeout_reported_as_activity_timeout() {
        let (queue, rx) = ActivityQueue::new(1);
        let _pool = WorkerPool::spawn(
            "q",
            rx,
            runner(Arc::new(HangingEvaluator)),
            1,
            CancellationToken::new(),
        );

        let err = queue
            .submit(AgentDefinition::new("slow"), HashMap::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SwitchboardError::ActivityTimeout { agent, timeout_secs: 1 } if agent == "slow"
        ));
    }

    #[tokio::test]
    async fn test_cancellation_stops_workers() {
        let (queue, rx) = ActivityQueue::new(1);
        let cancel = CancellationToken::new();
        let _pool = WorkerPool::spawn(
            "q",
            rx,
            runner(Arc::new(StaticEvaluator::new())),
            1,
            cancel.clone(),
        );

        cancel.cancel();
        // Give the worker a moment to observe cancellation and drop the queue.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = queue
            .submit(AgentDefinition::new("a"), HashMap::new(), 30)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::State(_)));
    }
}
