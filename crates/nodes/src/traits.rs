//! The `ExecutableNode` trait: the contract every node must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{NodeDefinition, NodeError};

/// Input handed to a node: upstream node id → that node's output.
///
/// Ordered by edge order. When a node has no executed upstream, the map holds
/// the caller's seed under `workflow_input` (if one was supplied) or is empty.
pub type NodeInput = Map<String, Value>;

/// Shared context passed to every node during execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the current execution run.
    pub execution_id: Uuid,
    /// Initial input supplied when the run was started.
    pub workflow_input: Option<Value>,
}

impl ExecutionContext {
    pub fn new(workflow_input: Option<Value>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            workflow_input,
        }
    }
}

/// The core node trait.
///
/// Handlers never write into the run's result map; they return a value and
/// the engine stores it. An `Err` is stored as an `{"error": ..}` payload.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute `node` with the outputs of its upstream nodes as `input`.
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError>;
}
