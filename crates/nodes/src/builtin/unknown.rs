use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::{ExecutableNode, ExecutionContext, NodeDefinition, NodeError, NodeInput};

/// Fallback for tags no handler is registered for.
///
/// Returns a diagnostic payload instead of failing, echoing the input so the
/// caller can see what the node would have received.
#[derive(Debug, Default, Clone)]
pub struct UnknownNode;

#[async_trait]
impl ExecutableNode for UnknownNode {
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        warn!(node_id = %node.id, node_type = %node.kind, "unsupported node type");
        Ok(json!({
            "error": format!("unsupported node type: {}", node.kind),
            "input_data": input,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::{ctx, input, node};
    use crate::NodeKind;

    #[tokio::test]
    async fn reports_the_type_and_echoes_input() {
        let out = UnknownNode
            .execute(
                &node(NodeKind::from("teleport"), Value::Null),
                input(json!({ "up": 1 })),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            json!({ "error": "unsupported node type: teleport", "input_data": { "up": 1 } })
        );
    }
}
