use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::first_input;
use crate::expr::{Expression, Vars};
use crate::{ExecutableNode, ExecutionContext, NodeDefinition, NodeError, NodeInput};

/// Evaluates `config.condition` with the first input bound as `data` and
/// reports which branch label applies.
///
/// The branch is advisory: the engine still runs every downstream node.
#[derive(Debug, Default, Clone)]
pub struct ConditionalNode;

#[async_trait]
impl ExecutableNode for ConditionalNode {
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let source = match node.config_str("condition").map(str::trim) {
            None | Some("") => return Ok(Value::Object(input)),
            Some(source) => source,
        };
        let true_branch = node.config_str("true_branch").unwrap_or("");
        let false_branch = node.config_str("false_branch").unwrap_or("");

        let data = first_input(&input);
        let mut vars = Vars::new();
        vars.insert("data".to_owned(), data.clone());

        let outcome = Expression::compile(source).and_then(|expr| expr.evaluate_bool(&vars));
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                error!(node_id = %node.id, error = %err, "condition evaluation failed");
                return Err(NodeError::Failed(format!("condition evaluation failed: {err}")));
            }
        };

        let branch = if result { true_branch } else { false_branch };
        debug!(node_id = %node.id, result, branch, "condition evaluated");
        Ok(json!({
            "condition_result": result,
            "branch": branch,
            "data": data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::{ctx, input, node};
    use crate::NodeKind;

    fn config(condition: &str) -> Value {
        json!({ "condition": condition, "true_branch": "big", "false_branch": "small" })
    }

    #[tokio::test]
    async fn picks_the_true_branch() {
        let out = ConditionalNode
            .execute(
                &node(NodeKind::Conditional, config("len(data.items) > 1")),
                input(json!({ "src": { "data": { "items": [1, 2, 3] } } })),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            json!({ "condition_result": true, "branch": "big", "data": { "items": [1, 2, 3] } })
        );
    }

    #[tokio::test]
    async fn picks_the_false_branch() {
        let out = ConditionalNode
            .execute(&node(NodeKind::Conditional, config("data.total >= 10")), input(json!({ "src": { "total": 4 } })), &ctx())
            .await
            .unwrap();
        assert_eq!(out["condition_result"], false);
        assert_eq!(out["branch"], "small");
    }

    #[tokio::test]
    async fn evaluation_failure_is_reported() {
        let err = ConditionalNode
            .execute(&node(NodeKind::Conditional, config("data.total > 'x'")), input(json!({ "src": { "total": 4 } })), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("condition evaluation failed: "));
    }
}
