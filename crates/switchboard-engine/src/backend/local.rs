use std::sync::Arc;

use futures::future::BoxFuture;

use switchboard_core::error::Result;

use crate::runner::{StepExecution, UnitRunner};

use super::{ActivityRequest, Backend};

/// In-process execution: the unit of work runs directly on the caller's
/// task, errors propagate synchronously to the orchestration loop.
///
/// Queue names and start-to-close timeouts in the activity config are
/// durable-backend concerns and are ignored here.
pub struct LocalBackend {
    runner: Arc<UnitRunner>,
}

impl LocalBackend {
    pub fn new(runner: Arc<UnitRunner>) -> Self {
        Self { runner }
    }
}

impl Backend for LocalBackend {
    fn execute(&self, req: ActivityRequest) -> BoxFuture<'_, Result<StepExecution>> {
        Box::pin(async move { self.runner.run_once(&req.def, req.inputs).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use switchboard_core::config::ActivityConfig;
    use switchboard_core::types::{AgentDefinition, RunId};
    use switchboard_test_utils::StaticEvaluator;

    use crate::registry::InMemoryRegistry;

    #[tokio::test]
    async fn test_executes_in_process() {
        let mut outputs = HashMap::new();
        outputs.insert("done".to_string(), serde_json::json!(true));
        let evaluator = Arc::new(StaticEvaluator::new().agent_outputs("a", outputs));

        let runner = Arc::new(UnitRunner::new(
            evaluator,
            Arc::new(InMemoryRegistry::new()),
        ));
        let backend = LocalBackend::new(runner);

        let req = ActivityRequest {
            run_id: RunId::new(),
            step: 0,
            def: AgentDefinition::new("a"),
            inputs: HashMap::new(),
            activity: ActivityConfig::default(),
        };

        let exec = backend.execute(req).await.unwrap();
        assert_eq!(exec.outputs["done"], serde_json::json!(true));
    }
}
