pub mod backend;
pub mod context;
pub mod handoff;
pub mod orchestrator;
pub mod registry;
pub mod runner;

pub use backend::{Backend, DurableBackend, LocalBackend, RunStateStore};
pub use context::ExecutionContext;
pub use orchestrator::{Orchestrator, RunFailure, RunOutcome};
pub use registry::InMemoryRegistry;
pub use runner::{StepExecution, UnitRunner};
