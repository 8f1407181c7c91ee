//! Mocks and fixtures shared across Switchboard test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::{Evaluator, HandoffScorer, RunHook, ToolFn};
use switchboard_core::types::{AgentDefinition, ScoredCandidate};

/// Initialize tracing for a test binary. Safe to call more than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Evaluator returning a fixed output map per agent name.
///
/// Unknown agents produce an empty output map.
pub struct StaticEvaluator {
    outputs: HashMap<String, HashMap<String, serde_json::Value>>,
    calls: AtomicU32,
}

impl StaticEvaluator {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            calls: AtomicU32::new(0),
        }
    }

    /// Configure the outputs produced for an agent.
    pub fn agent_outputs(
        mut self,
        agent: impl Into<String>,
        outputs: HashMap<String, serde_json::Value>,
    ) -> Self {
        self.outputs.insert(agent.into(), outputs);
        self
    }

    /// Number of evaluate calls observed.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for StaticEvaluator {
    fn evaluate<'a>(
        &'a self,
        def: &'a AgentDefinition,
        _inputs: &'a HashMap<String, serde_json::Value>,
        _tools: &'a [Arc<dyn ToolFn>],
    ) -> BoxFuture<'a, Result<HashMap<String, serde_json::Value>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outputs.get(&def.name).cloned().unwrap_or_default())
        })
    }
}

/// One scripted evaluator outcome.
pub enum ScriptedOutcome {
    Ok(HashMap<String, serde_json::Value>),
    Err { kind: String, message: String },
}

/// Evaluator consuming a fixed sequence of outcomes across calls.
///
/// Panics if called more times than the script covers.
pub struct ScriptedEvaluator {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    calls: AtomicU32,
}

impl ScriptedEvaluator {
    pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Evaluator for ScriptedEvaluator {
    fn evaluate<'a>(
        &'a self,
        def: &'a AgentDefinition,
        _inputs: &'a HashMap<String, serde_json::Value>,
        _tools: &'a [Arc<dyn ToolFn>],
    ) -> BoxFuture<'a, Result<HashMap<String, serde_json::Value>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("ScriptedEvaluator ran out of outcomes");
            match outcome {
                ScriptedOutcome::Ok(outputs) => Ok(outputs),
                ScriptedOutcome::Err { kind, message } => Err(SwitchboardError::Evaluation {
                    agent: def.name.clone(),
                    kind,
                    message,
                }),
            }
        })
    }
}

/// Evaluator failing a fixed number of times before succeeding.
pub struct FlakyEvaluator {
    fails: u32,
    kind: String,
    outputs: HashMap<String, serde_json::Value>,
    calls: AtomicU32,
}

impl FlakyEvaluator {
    /// Evaluator failing `fails` times with `kind`, then succeeding with
    /// `outputs` forever after.
    pub fn new(
        fails: u32,
        kind: impl Into<String>,
        outputs: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            fails,
            kind: kind.into(),
            outputs,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Evaluator for FlakyEvaluator {
    fn evaluate<'a>(
        &'a self,
        def: &'a AgentDefinition,
        _inputs: &'a HashMap<String, serde_json::Value>,
        _tools: &'a [Arc<dyn ToolFn>],
    ) -> BoxFuture<'a, Result<HashMap<String, serde_json::Value>>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fails {
                Err(SwitchboardError::Evaluation {
                    agent: def.name.clone(),
                    kind: self.kind.clone(),
                    message: format!("transient failure {}", call + 1),
                })
            } else {
                Ok(self.outputs.clone())
            }
        })
    }
}

/// Hook recording every invocation as "`phase`:`agent`".
pub struct RecordingHook {
    label: String,
    events: Mutex<Vec<String>>,
}

impl RecordingHook {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, phase: &str, agent: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.label, phase, agent));
    }
}

impl RunHook for RecordingHook {
    fn before_run<'a>(
        &'a self,
        agent: &'a AgentDefinition,
        _inputs: &'a mut HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record("before", &agent.name);
            Ok(())
        })
    }

    fn after_run<'a>(
        &'a self,
        agent: &'a AgentDefinition,
        _inputs: &'a HashMap<String, serde_json::Value>,
        _outputs: &'a mut HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record("after", &agent.name);
            Ok(())
        })
    }

    fn on_error<'a>(
        &'a self,
        agent: &'a AgentDefinition,
        _error: &'a SwitchboardError,
        _inputs: &'a HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.record("error", &agent.name);
        })
    }
}

/// Hook stamping a marker into inputs before the run and outputs after it.
///
/// Used to verify that hook mutations are visible to later hooks, the
/// evaluator, and the recorded RunRecord.
pub struct StampHook {
    pub key: String,
    pub value: serde_json::Value,
}

impl StampHook {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl RunHook for StampHook {
    fn before_run<'a>(
        &'a self,
        _agent: &'a AgentDefinition,
        inputs: &'a mut HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            inputs.insert(self.key.clone(), self.value.clone());
            Ok(())
        })
    }

    fn after_run<'a>(
        &'a self,
        _agent: &'a AgentDefinition,
        _inputs: &'a HashMap<String, serde_json::Value>,
        outputs: &'a mut HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            outputs.insert(self.key.clone(), self.value.clone());
            Ok(())
        })
    }
}

/// Scorer returning a fixed candidate list.
pub struct FixedScorer {
    candidates: Vec<ScoredCandidate>,
}

impl FixedScorer {
    pub fn new(candidates: Vec<ScoredCandidate>) -> Self {
        Self { candidates }
    }
}

impl HandoffScorer for FixedScorer {
    fn score<'a>(
        &'a self,
        _current_agent: &'a str,
        _result: &'a HashMap<String, serde_json::Value>,
        _variables: &'a HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<Vec<ScoredCandidate>>> {
        Box::pin(async move { Ok(self.candidates.clone()) })
    }
}

/// Tool echoing its input back.
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ToolFn for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, input: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move { Ok(input) })
    }
}
