//! `engine` crate: workflow models, the dependency graph, and the
//! execution orchestrator.

pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
mod scheduler;
pub mod store;

pub use dag::DependencyGraph;
pub use error::EngineError;
pub use executor::{ExecutionMode, ExecutorConfig, RunResult, WorkflowExecutor};
pub use models::{Edge, NodeDefinition, NodeKind, Workflow};
pub use store::{ResultStore, WORKFLOW_INPUT_KEY};
