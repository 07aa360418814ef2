//! `MockNode`: a recording test double for `ExecutableNode`.
//!
//! Used by the engine tests to observe how often each node ran and what
//! input it was handed, without doing any real work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ExecutableNode, ExecutionContext, NodeDefinition, NodeError, NodeInput};

/// What a `MockNode` does when executed.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return this value verbatim.
    ReturnValue(Value),
    /// Echo the received input back as an object.
    EchoInput,
    /// Fail with `NodeError::Failed`.
    Fail(String),
    /// Panic inside the handler.
    Panic(String),
    /// Sleep, then return the value.
    Sleep(Duration, Value),
}

/// One recorded invocation: node id and the input it received.
pub type MockCall = (String, Value);

/// A mock handler shared by any number of nodes.
///
/// The default behaviour applies to every node unless one was set for that
/// node id with [`MockNode::on_node`].
#[derive(Debug)]
pub struct MockNode {
    default: MockBehaviour,
    per_node: HashMap<String, MockBehaviour>,
    /// All calls seen by this handler, in call order.
    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockNode {
    pub fn new(default: MockBehaviour) -> Self {
        Self {
            default,
            per_node: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(value: Value) -> Self {
        Self::new(MockBehaviour::ReturnValue(value))
    }

    pub fn echoing() -> Self {
        Self::new(MockBehaviour::EchoInput)
    }

    /// Create a mock that always fails with the given message.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self::new(MockBehaviour::Fail(msg.into()))
    }

    /// Override the behaviour for one node id.
    pub fn on_node(mut self, node_id: impl Into<String>, behaviour: MockBehaviour) -> Self {
        self.per_node.insert(node_id.into(), behaviour);
        self
    }

    /// Total number of executions across all nodes.
    pub fn call_count(&self) -> usize {
        self.lock().len()
    }

    pub fn call_count_for(&self, node_id: &str) -> usize {
        self.lock().iter().filter(|(id, _)| id == node_id).count()
    }

    /// Inputs received by `node_id`, in call order.
    pub fn inputs_for(&self, node_id: &str) -> Vec<Value> {
        self.lock()
            .iter()
            .filter(|(id, _)| id == node_id)
            .map(|(_, input)| input.clone())
            .collect()
    }

    /// Node ids in the order they were executed.
    pub fn invoked_nodes(&self) -> Vec<String> {
        self.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let input = Value::Object(input);
        self.lock().push((node.id.clone(), input.clone()));

        let behaviour = self.per_node.get(&node.id).unwrap_or(&self.default);
        match behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::EchoInput => Ok(input),
            MockBehaviour::Fail(msg) => Err(NodeError::Failed(msg.clone())),
            MockBehaviour::Panic(msg) => panic!("{msg}"),
            MockBehaviour::Sleep(duration, v) => {
                tokio::time::sleep(*duration).await;
                Ok(v.clone())
            }
        }
    }
}
