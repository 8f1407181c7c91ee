use crate::types::RunId;

/// Run lifecycle event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Orchestration run started.
    RunStarted { run_id: RunId, agent: String },
    /// One agent execution completed and was appended to history.
    StepCompleted {
        run_id: RunId,
        agent: String,
        step: usize,
    },
    /// A failed attempt will be retried after a backoff.
    RetryScheduled {
        run_id: RunId,
        agent: String,
        attempt: u32,
        backoff_ms: u64,
    },
    /// A router produced a handoff to the next agent.
    HandoffRouted {
        run_id: RunId,
        from: String,
        to: String,
    },
    /// Run reached COMPLETED.
    RunCompleted { run_id: RunId, steps: usize },
    /// Run reached FAILED.
    RunFailed { run_id: RunId, error: String },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: RunEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
