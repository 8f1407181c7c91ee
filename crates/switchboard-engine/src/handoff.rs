use std::collections::HashMap;

use tracing::debug;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::Registry;
use switchboard_core::types::{AgentDefinition, HandoffMode, HandoffRequest, PREVIOUS_AGENT_OUTPUT};

use crate::context::ExecutionContext;

/// Resolve which agent a handoff request selects.
///
/// Precedence: `override_next_agent` > `next_agent` > `inline_definition`.
/// Named agents are looked up in the registry; a miss fails the step with
/// `AgentNotFound`. `Ok(None)` means the request names no next agent.
pub fn select_next(
    request: &HandoffRequest,
    registry: &dyn Registry,
) -> Result<Option<AgentDefinition>> {
    let name = request
        .override_next_agent
        .as_deref()
        .or(request.next_agent.as_deref());

    if let Some(name) = name {
        return match registry.get_agent(name) {
            Some(def) => Ok(Some(def)),
            None => Err(SwitchboardError::AgentNotFound(name.to_string())),
        };
    }

    Ok(request.inline_definition.clone())
}

/// Apply a handoff's input mapping to the context.
///
/// - MATCH: declared inputs of the next agent pass through same-named
///   context variables unchanged; no new context keys are introduced.
/// - ADD: additionally merges the current agent's declared output keys
///   from `result` into context, overwriting same-named variables.
/// - The reserved `previous_agent_output` key is set unconditionally,
///   independent of mode.
/// - `override_context` entries are applied last and win over MATCH/ADD
///   results; `previous_agent_output` is re-asserted afterwards so the
///   reserved key always holds the engine-written value.
pub fn apply_handoff(
    request: &HandoffRequest,
    current: &AgentDefinition,
    result: &HashMap<String, serde_json::Value>,
    ctx: &mut ExecutionContext,
) {
    if request.mode == HandoffMode::Add {
        for field in &current.output_spec {
            if let Some(value) = result.get(&field.key) {
                ctx.set(field.key.clone(), value.clone());
            }
        }
    }

    ctx.set(
        PREVIOUS_AGENT_OUTPUT,
        previous_output_value(&current.name, result),
    );

    if let Some(overrides) = &request.override_context {
        debug!(
            count = overrides.len(),
            agent = %current.name,
            "Applying handoff context overrides"
        );
        for (k, v) in overrides {
            ctx.set(k.clone(), v.clone());
        }
        // The reserved key survives any override.
        ctx.set(
            PREVIOUS_AGENT_OUTPUT,
            previous_output_value(&current.name, result),
        );
    }
}

/// The value stored under the reserved `previous_agent_output` key.
pub fn previous_output_value(
    agent_name: &str,
    result: &HashMap<String, serde_json::Value>,
) -> serde_json::Value {
    serde_json::json!({
        "agent_name": agent_name,
        "output": result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use switchboard_core::types::FieldSpec;

    use crate::registry::InMemoryRegistry;

    fn registry_with(agents: Vec<AgentDefinition>) -> InMemoryRegistry {
        let mut registry = InMemoryRegistry::new();
        for def in agents {
            registry.register(def);
        }
        registry
    }

    fn agent_a() -> AgentDefinition {
        AgentDefinition::new("A")
            .with_inputs(vec![FieldSpec::required("x")])
            .with_outputs(vec![FieldSpec::required("y")])
    }

    fn result_y2() -> HashMap<String, serde_json::Value> {
        let mut m = HashMap::new();
        m.insert("y".to_string(), serde_json::json!(2));
        m
    }

    #[test]
    fn test_select_next_by_name() {
        let registry = registry_with(vec![AgentDefinition::new("B")]);
        let req = HandoffRequest::to_agent("B", HandoffMode::Add);
        let def = select_next(&req, &registry).unwrap().unwrap();
        assert_eq!(def.name, "B");
    }

    #[test]
    fn test_select_next_unregistered_fails() {
        let registry = registry_with(vec![]);
        let req = HandoffRequest::to_agent("Z", HandoffMode::Add);
        let err = select_next(&req, &registry).unwrap_err();
        assert!(matches!(err, SwitchboardError::AgentNotFound(name) if name == "Z"));
    }

    #[test]
    fn test_select_next_override_wins() {
        let registry =
            registry_with(vec![AgentDefinition::new("B"), AgentDefinition::new("C")]);
        let mut req = HandoffRequest::to_agent("B", HandoffMode::Add);
        req.override_next_agent = Some("C".to_string());
        let def = select_next(&req, &registry).unwrap().unwrap();
        assert_eq!(def.name, "C");
    }

    #[test]
    fn test_select_next_inline() {
        let registry = registry_with(vec![]);
        let req = HandoffRequest::to_inline(AgentDefinition::new("adhoc"), HandoffMode::Match);
        let def = select_next(&req, &registry).unwrap().unwrap();
        assert_eq!(def.name, "adhoc");
    }

    #[test]
    fn test_select_next_empty_request() {
        let registry = registry_with(vec![]);
        let req = HandoffRequest::default();
        assert!(select_next(&req, &registry).unwrap().is_none());
    }

    #[test]
    fn test_add_mode_merges_declared_outputs() {
        let mut ctx = ExecutionContext::new();
        ctx.set("x", serde_json::json!(1));

        let req = HandoffRequest::to_agent("B", HandoffMode::Add);
        apply_handoff(&req, &agent_a(), &result_y2(), &mut ctx);

        assert_eq!(ctx.get("x"), Some(&serde_json::json!(1)));
        assert_eq!(ctx.get("y"), Some(&serde_json::json!(2)));

        let prev = ctx.get(PREVIOUS_AGENT_OUTPUT).unwrap();
        assert_eq!(prev["agent_name"], serde_json::json!("A"));
        assert_eq!(prev["output"]["y"], serde_json::json!(2));
    }

    #[test]
    fn test_match_mode_introduces_no_keys() {
        let mut ctx = ExecutionContext::new();
        ctx.set("x", serde_json::json!(1));

        let req = HandoffRequest::to_agent("B", HandoffMode::Match);
        apply_handoff(&req, &agent_a(), &result_y2(), &mut ctx);

        // Only the reserved key was introduced.
        assert_eq!(ctx.get("y"), None);
        assert_eq!(ctx.variables().len(), 2);
        assert!(ctx.get(PREVIOUS_AGENT_OUTPUT).is_some());
    }

    #[test]
    fn test_add_mode_skips_undeclared_result_keys() {
        let mut ctx = ExecutionContext::new();
        let mut result = result_y2();
        result.insert("undeclared".to_string(), serde_json::json!("x"));

        let req = HandoffRequest::to_agent("B", HandoffMode::Add);
        apply_handoff(&req, &agent_a(), &result, &mut ctx);

        assert_eq!(ctx.get("y"), Some(&serde_json::json!(2)));
        assert_eq!(ctx.get("undeclared"), None);
    }

    #[test]
    fn test_override_context_wins_over_add() {
        let mut ctx = ExecutionContext::new();
        let mut overrides = HashMap::new();
        overrides.insert("y".to_string(), serde_json::json!(99));

        let req =
            HandoffRequest::to_agent("B", HandoffMode::Add).with_override_context(overrides);
        apply_handoff(&req, &agent_a(), &result_y2(), &mut ctx);

        assert_eq!(ctx.get("y"), Some(&serde_json::json!(99)));
    }

    #[test]
    fn test_reserved_key_reasserted_after_override() {
        let mut ctx = ExecutionContext::new();
        let mut overrides = HashMap::new();
        overrides.insert(
            PREVIOUS_AGENT_OUTPUT.to_string(),
            serde_json::json!("spoofed"),
        );

        let req =
            HandoffRequest::to_agent("B", HandoffMode::Add).with_override_context(overrides);
        apply_handoff(&req, &agent_a(), &result_y2(), &mut ctx);

        let prev = ctx.get(PREVIOUS_AGENT_OUTPUT).unwrap();
        assert_eq!(prev["agent_name"], serde_json::json!("A"));
    }
}
