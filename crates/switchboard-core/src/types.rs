use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ActivityConfig, RetryPolicy};
use crate::router::Router;

/// Reserved context key carrying the previous agent's name and output.
/// Always present after a handoff, regardless of mode or overrides.
pub const PREVIOUS_AGENT_OUTPUT: &str = "previous_agent_output";

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One declared input or output field of an agent.
///
/// `type_hint` is informative only; the engine does not type-check values.
/// A field with a `default` is optional: the default is used when no context
/// variable of the same name resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    #[serde(default)]
    pub type_hint: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl FieldSpec {
    /// Create a required field.
    pub fn required(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            type_hint: None,
            description: None,
            default: None,
        }
    }

    /// Create an optional field with a default value.
    pub fn with_default(key: impl Into<String>, default: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            type_hint: None,
            description: None,
            default: Some(default),
        }
    }

    /// Set the type hint.
    pub fn typed(mut self, type_hint: impl Into<String>) -> Self {
        self.type_hint = Some(type_hint.into());
        self
    }

    /// Set the description.
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named unit of work with declared typed inputs and outputs.
///
/// Immutable once registered. An agent without a router is terminal: the
/// run completes after it executes.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    /// Unique, non-empty name.
    pub name: String,
    /// Declared inputs, resolved from context before each execution.
    pub input_spec: Vec<FieldSpec>,
    /// Declared outputs, merged into context under ADD handoffs.
    pub output_spec: Vec<FieldSpec>,
    /// Tool names resolved through the registry and passed to the evaluator.
    pub tools: Vec<String>,
    /// Routing policy deciding the next agent. None = terminal agent.
    pub router: Option<Router>,
    /// Per-agent retry override (takes precedence over the run-wide default).
    pub retry: Option<RetryPolicy>,
    /// Per-agent activity override for the Durable backend.
    pub activity: Option<ActivityConfig>,
}

impl AgentDefinition {
    /// Create a new agent definition with minimal configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_spec: vec![],
            output_spec: vec![],
            tools: vec![],
            router: None,
            retry: None,
            activity: None,
        }
    }

    /// Set the declared inputs.
    pub fn with_inputs(mut self, inputs: Vec<FieldSpec>) -> Self {
        self.input_spec = inputs;
        self
    }

    /// Set the declared outputs.
    pub fn with_outputs(mut self, outputs: Vec<FieldSpec>) -> Self {
        self.output_spec = outputs;
        self
    }

    /// Set the tools available to this agent.
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the routing policy.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Set a retry policy override.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set an activity config override.
    pub fn with_activity(mut self, activity: ActivityConfig) -> Self {
        self.activity = Some(activity);
        self
    }
}

/// How context variables flow into the next agent on a handoff.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffMode {
    /// Pass through same-named context variables for the next agent's
    /// declared inputs; introduce no new context keys.
    Match,
    /// Match behavior, plus merge the current agent's declared output keys
    /// into context (overwriting same-named variables).
    #[default]
    Add,
}

/// A router's decision to transfer control to another agent.
///
/// Produced fresh per router call and consumed by exactly one step.
/// Selection precedence: `override_next_agent` > `next_agent` >
/// `inline_definition`. A request naming none of the three is a no-handoff.
#[derive(Debug, Clone, Default)]
pub struct HandoffRequest {
    /// Registered name of the next agent.
    pub next_agent: Option<String>,
    /// An unregistered definition to run next (bypasses the registry).
    pub inline_definition: Option<AgentDefinition>,
    /// Overrides `next_agent` for selection; mapping still follows the
    /// selected agent's declared inputs.
    pub override_next_agent: Option<String>,
    /// Variable-flow mode for this handoff.
    pub mode: HandoffMode,
    /// Entries applied to context last, winning over MATCH/ADD results.
    pub override_context: Option<HashMap<String, serde_json::Value>>,
}

impl HandoffRequest {
    /// Request a handoff to a registered agent.
    pub fn to_agent(name: impl Into<String>, mode: HandoffMode) -> Self {
        Self {
            next_agent: Some(name.into()),
            mode,
            ..Default::default()
        }
    }

    /// Request a handoff to an inline definition.
    pub fn to_inline(def: AgentDefinition, mode: HandoffMode) -> Self {
        Self {
            inline_definition: Some(def),
            mode,
            ..Default::default()
        }
    }

    /// Attach context overrides applied after MATCH/ADD mapping.
    pub fn with_override_context(mut self, vars: HashMap<String, serde_json::Value>) -> Self {
        self.override_context = Some(vars);
        self
    }
}

/// A candidate produced by a `HandoffScorer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// Registered name of the candidate agent.
    pub agent: String,
    /// Confidence in [0.0, 1.0]; must exceed the router threshold to win.
    pub confidence: f64,
}

/// Write-once record of one successful agent execution.
///
/// Appended by the unit-of-work runner immediately after the agent
/// completes; history is never reordered or edited. Inputs and outputs are
/// snapshots taken after hooks ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub agent_name: String,
    pub timestamp: DateTime<Utc>,
    pub inputs: HashMap<String, serde_json::Value>,
    pub outputs: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_builder() {
        let def = AgentDefinition::new("triage")
            .with_inputs(vec![FieldSpec::required("ticket")])
            .with_outputs(vec![FieldSpec::required("category")])
            .with_tools(vec!["lookup".into()]);

        assert_eq!(def.name, "triage");
        assert_eq!(def.input_spec.len(), 1);
        assert_eq!(def.output_spec[0].key, "category");
        assert!(def.router.is_none());
        assert!(def.retry.is_none());
    }

    #[test]
    fn test_field_spec_default() {
        let field = FieldSpec::with_default("limit", serde_json::json!(10)).typed("number");
        assert_eq!(field.key, "limit");
        assert_eq!(field.default, Some(serde_json::json!(10)));
        assert_eq!(field.type_hint.as_deref(), Some("number"));
    }

    #[test]
    fn test_handoff_request_builders() {
        let req = HandoffRequest::to_agent("writer", HandoffMode::Match);
        assert_eq!(req.next_agent.as_deref(), Some("writer"));
        assert_eq!(req.mode, HandoffMode::Match);
        assert!(req.inline_definition.is_none());

        let req = HandoffRequest::to_inline(AgentDefinition::new("adhoc"), HandoffMode::Add);
        assert!(req.next_agent.is_none());
        assert_eq!(req.inline_definition.unwrap().name, "adhoc");
    }

    #[test]
    fn test_default_mode_is_add() {
        assert_eq!(HandoffMode::default(), HandoffMode::Add);
    }

    #[test]
    fn test_run_record_serialization() {
        let mut inputs = HashMap::new();
        inputs.insert("x".to_string(), serde_json::json!(1));
        let record = RunRecord {
            agent_name: "a".into(),
            timestamp: Utc::now(),
            inputs,
            outputs: HashMap::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: RunRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.agent_name, "a");
        assert_eq!(parsed.inputs["x"], serde_json::json!(1));
    }
}
