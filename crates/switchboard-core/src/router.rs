use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::traits::HandoffScorer;
use crate::types::{HandoffMode, HandoffRequest};

/// Routing policy deciding the next agent after one completes.
///
/// A closed set of tagged variants behind one `route` entry point; new
/// policies are added as variants, not subclasses. The decision logic of
/// the Scored variant lives in the external `HandoffScorer` collaborator;
/// the threshold check is enforced here, uniformly across policies.
#[derive(Clone)]
pub enum Router {
    /// Always hand off to a fixed agent (or stop when `next` is None).
    Static {
        next: Option<String>,
        mode: HandoffMode,
        override_context: Option<HashMap<String, serde_json::Value>>,
    },
    /// First arm whose condition matches wins; no match means stop.
    Conditional {
        arms: Vec<ConditionalArm>,
        mode: HandoffMode,
    },
    /// Delegate candidate scoring to a collaborator; hand off only when
    /// the best confidence exceeds `threshold`, otherwise stop.
    Scored {
        scorer: Arc<dyn HandoffScorer>,
        threshold: f64,
        mode: HandoffMode,
    },
}

/// One arm of a Conditional router.
///
/// `when: None` is a fallback arm that always matches.
#[derive(Debug, Clone)]
pub struct ConditionalArm {
    pub when: Option<String>,
    pub next: String,
    pub override_context: Option<HashMap<String, serde_json::Value>>,
}

impl ConditionalArm {
    /// Arm taken when `expr` matches against result/context.
    pub fn when(expr: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            when: Some(expr.into()),
            next: next.into(),
            override_context: None,
        }
    }

    /// Fallback arm, always taken when reached.
    pub fn otherwise(next: impl Into<String>) -> Self {
        Self {
            when: None,
            next: next.into(),
            override_context: None,
        }
    }
}

impl Router {
    /// A static router handing off to `next`.
    pub fn to(next: impl Into<String>) -> Self {
        Self::Static {
            next: Some(next.into()),
            mode: HandoffMode::default(),
            override_context: None,
        }
    }

    /// A static router configured to stop.
    pub fn stop() -> Self {
        Self::Static {
            next: None,
            mode: HandoffMode::default(),
            override_context: None,
        }
    }

    /// A conditional router over the given arms.
    pub fn conditional(arms: Vec<ConditionalArm>) -> Self {
        Self::Conditional {
            arms,
            mode: HandoffMode::default(),
        }
    }

    /// A scored router backed by an external scorer.
    pub fn scored(scorer: Arc<dyn HandoffScorer>, threshold: f64) -> Self {
        Self::Scored {
            scorer,
            threshold,
            mode: HandoffMode::default(),
        }
    }

    /// Change the handoff mode of this router.
    pub fn with_mode(mut self, new_mode: HandoffMode) -> Self {
        match &mut self {
            Self::Static { mode, .. }
            | Self::Conditional { mode, .. }
            | Self::Scored { mode, .. } => *mode = new_mode,
        }
        self
    }

    /// Decide the next handoff for `current_agent` given its result and the
    /// run's context variables. `Ok(None)` terminates the run.
    ///
    /// A routing failure propagates as an error; the loop treats it as a
    /// step failure, never as an implicit "no handoff".
    pub async fn route(
        &self,
        current_agent: &str,
        result: &HashMap<String, serde_json::Value>,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Result<Option<HandoffRequest>> {
        match self {
            Self::Static {
                next,
                mode,
                override_context,
            } => Ok(next.as_ref().map(|n| HandoffRequest {
                next_agent: Some(n.clone()),
                mode: *mode,
                override_context: override_context.clone(),
                ..Default::default()
            })),

            Self::Conditional { arms, mode } => {
                for arm in arms {
                    let matches = match &arm.when {
                        Some(expr) => evaluate_condition(expr, result, variables),
                        None => true,
                    };
                    if matches {
                        debug!(
                            agent = current_agent,
                            next = %arm.next,
                            "Conditional arm matched"
                        );
                        return Ok(Some(HandoffRequest {
                            next_agent: Some(arm.next.clone()),
                            mode: *mode,
                            override_context: arm.override_context.clone(),
                            ..Default::default()
                        }));
                    }
                }
                Ok(None)
            }

            Self::Scored {
                scorer,
                threshold,
                mode,
            } => {
                let candidates = scorer.score(current_agent, result, variables).await?;
                let best = candidates.into_iter().max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                match best {
                    Some(c) if c.confidence > *threshold => {
                        debug!(
                            agent = current_agent,
                            next = %c.agent,
                            confidence = c.confidence,
                            "Scored handoff accepted"
                        );
                        Ok(Some(HandoffRequest::to_agent(c.agent, *mode)))
                    }
                    Some(c) => {
                        debug!(
                            agent = current_agent,
                            best = %c.agent,
                            confidence = c.confidence,
                            threshold,
                            "No candidate exceeded threshold, stopping"
                        );
                        Ok(None)
                    }
                    None => Ok(None),
                }
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static { next, mode, .. } => f
                .debug_struct("Static")
                .field("next", next)
                .field("mode", mode)
                .finish(),
            Self::Conditional { arms, mode } => f
                .debug_struct("Conditional")
                .field("arms", &arms.len())
                .field("mode", mode)
                .finish(),
            Self::Scored {
                threshold, mode, ..
            } => f
                .debug_struct("Scored")
                .field("threshold", threshold)
                .field("mode", mode)
                .finish(),
        }
    }
}

/// Evaluate a simple condition against the step result, falling back to
/// context variables for keys the result does not carry.
///
/// Supported expressions:
/// - `key == "value"`: exact match
/// - `key != "value"`: not equal
/// - `key contains "substr"`: substring match
///
/// Returns `false` for unparseable expressions.
pub fn evaluate_condition(
    expr: &str,
    result: &HashMap<String, serde_json::Value>,
    variables: &HashMap<String, serde_json::Value>,
) -> bool {
    let expr = expr.trim();
    let lookup = |key: &str| result.get(key).or_else(|| variables.get(key));

    // key contains "value"
    if let Some((key, substr)) = parse_operator(expr, "contains") {
        return lookup(key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s.contains(substr));
    }

    // key != "value"
    if let Some((key, value)) = parse_operator(expr, "!=") {
        return lookup(key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s != value);
    }

    // key == "value"
    if let Some((key, value)) = parse_operator(expr, "==") {
        return lookup(key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s == value);
    }

    false
}

/// Parse `key OP "value"` expressions, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let parts: Vec<&str> = expr.splitn(2, op).collect();
    if parts.len() != 2 {
        return None;
    }
    let key = parts[0].trim();
    let val = parts[1].trim().trim_matches('"');
    Some((key, val))
}
