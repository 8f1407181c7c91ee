use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};

/// Retry configuration for one agent's unit of work.
///
/// Resolution precedence: agent-specific > run-wide default > built-in
/// default. Retries are scoped to a single agent execution, never to the
/// whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (must be >= 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Error kinds that fail immediately without retrying.
    /// Matched against `SwitchboardError::kind()`.
    #[serde(default)]
    pub non_retryable_kinds: HashSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            non_retryable_kinds: HashSet::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Mark an error kind as non-retryable.
    pub fn non_retryable(mut self, kind: impl Into<String>) -> Self {
        self.non_retryable_kinds.insert(kind.into());
        self
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Where and how a unit of work executes under the Durable backend.
///
/// The Local backend ignores the queue name; the timeout only bounds
/// durably dispatched activities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Named queue the activity is dispatched to.
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Start-to-close timeout for one dispatch. Exceeding it is a
    /// retryable failure.
    #[serde(default = "default_start_to_close")]
    pub start_to_close_timeout_secs: u64,
    /// Activity-level retry override.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            start_to_close_timeout_secs: default_start_to_close(),
            retry: None,
        }
    }
}

impl ActivityConfig {
    /// Create a config targeting a named queue.
    pub fn on_queue(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Default::default()
        }
    }

    /// Set the start-to-close timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.start_to_close_timeout_secs = secs;
        self
    }
}

fn default_queue() -> String {
    "default".to_string()
}
fn default_start_to_close() -> u64 {
    300
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard cap on agent executions per run; guards against cyclic
    /// handoff graphs.
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    /// Capacity of the run event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Worker tasks per named queue (Durable backend).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Run-wide retry default, overridable per agent.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Run-wide activity default, overridable per agent.
    #[serde(default)]
    pub activity: Option<ActivityConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            event_capacity: default_event_capacity(),
            workers: default_workers(),
            retry: None,
            activity: None,
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchboardError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SwitchboardError::Config(e.to_string()))
    }
}

fn default_max_hops() -> usize {
    25
}
fn default_event_capacity() -> usize {
    256
}
fn default_workers() -> usize {
    4
}
