use std::collections::HashMap;
use std::sync::Arc;

use switchboard_core::traits::{Registry, ToolFn};
use switchboard_core::types::AgentDefinition;

/// In-memory registry populated before a run starts.
///
/// Registration is not part of the run-time concurrency contract: build the
/// registry, then hand it to the orchestrator. Alternative storage backends
/// implement the `Registry` trait themselves.
#[derive(Default)]
pub struct InMemoryRegistry {
    agents: HashMap<String, AgentDefinition>,
    tools: HashMap<String, Arc<dyn ToolFn>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent definition. Last registration wins on name clash.
    pub fn register(&mut self, def: AgentDefinition) {
        self.agents.insert(def.name.clone(), def);
    }

    /// Register a callable tool.
    pub fn register_tool(&mut self, tool: Arc<dyn ToolFn>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Names of all registered agents.
    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.keys().map(|s| s.as_str()).collect()
    }
}

impl Registry for InMemoryRegistry {
    fn get_agent(&self, name: &str) -> Option<AgentDefinition> {
        self.agents.get(name).cloned()
    }

    fn get_tool(&self, name: &str) -> Option<Arc<dyn ToolFn>> {
        self.tools.get(name).cloned()
    }
}
