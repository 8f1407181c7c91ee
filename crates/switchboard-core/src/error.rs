use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchboardError {
    // Input resolution errors
    #[error("Required input '{key}' for agent '{agent}' could not be resolved from context")]
    InputResolution { agent: String, key: String },

    // Registry errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    // Routing errors
    #[error("Router for agent '{agent}' failed: {message}")]
    Routing { agent: String, message: String },

    // Evaluation errors (wrapped failures from the Evaluator collaborator)
    #[error("Evaluation failed for agent '{agent}' ({kind}): {message}")]
    Evaluation {
        agent: String,
        kind: String,
        message: String,
    },

    // Activity errors (Durable backend)
    #[error("Activity for agent '{agent}' timed out after {timeout_secs}s")]
    ActivityTimeout { agent: String, timeout_secs: u64 },

    #[error("Retries exhausted for agent '{agent}' after {attempts} attempts: {last}")]
    RetryExhausted {
        agent: String,
        attempts: u32,
        last: String,
    },

    // Loop errors
    #[error("Run exceeded max hops ({0})")]
    MaxHopsExceeded(usize),

    #[error("Run cancelled")]
    Cancelled,

    // Durable state errors
    #[error("State store error: {0}")]
    State(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchboardError {
    /// Classification string matched against `RetryPolicy::non_retryable_kinds`.
    ///
    /// Evaluation errors surface the kind supplied by the evaluator (e.g.
    /// "ValidationError"); everything else maps to a fixed engine kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::InputResolution { .. } => "input_resolution",
            Self::AgentNotFound(_) => "agent_not_found",
            Self::Routing { .. } => "routing",
            Self::Evaluation { kind, .. } => kind,
            Self::ActivityTimeout { .. } => "activity_timeout",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::MaxHopsExceeded(_) => "max_hops",
            Self::Cancelled => "cancelled",
            Self::State(_) => "state",
            Self::Config(_) | Self::ConfigNotFound(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_kind_passthrough() {
        let err = SwitchboardError::Evaluation {
            agent: "a".into(),
            kind: "ValidationError".into(),
            message: "bad input".into(),
        };
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_engine_kinds() {
        let err = SwitchboardError::ActivityTimeout {
            agent: "a".into(),
            timeout_secs: 30,
        };
        assert_eq!(err.kind(), "activity_timeout");
        assert_eq!(SwitchboardError::Cancelled.kind(), "cancelled");
    }
}
