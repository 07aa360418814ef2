use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::unwrap_envelope;
use crate::expr::{Expression, Vars};
use crate::{ExecutableNode, ExecutionContext, NodeDefinition, NodeError, NodeInput};

/// Keeps the elements of every list input for which `config.condition`
/// holds, with the element bound as `item`.
///
/// Inputs are unwrapped from one `{"data": ..}` envelope first. Non-list
/// inputs pass through unchanged, and an element whose condition fails to
/// evaluate is dropped.
#[derive(Debug, Default, Clone)]
pub struct FilterNode;

#[async_trait]
impl ExecutableNode for FilterNode {
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let condition = match node.config_str("condition").map(str::trim) {
            None | Some("") => return Ok(Value::Object(input)),
            Some(condition) => Expression::compile(condition)?,
        };

        let mut filtered = Map::new();
        for (source_id, value) in &input {
            let value = match unwrap_envelope(value) {
                Value::Array(items) => {
                    let kept = items
                        .iter()
                        .filter(|item| keep(&condition, item, &node.id))
                        .cloned()
                        .collect();
                    Value::Array(kept)
                }
                other => other.clone(),
            };
            filtered.insert(source_id.clone(), value);
        }

        Ok(Value::Object(filtered))
    }
}

fn keep(condition: &Expression, item: &Value, node_id: &str) -> bool {
    let mut vars = Vars::new();
    vars.insert("item".to_owned(), item.clone());
    match condition.evaluate_bool(&vars) {
        Ok(keep) => keep,
        Err(err) => {
            debug!(node_id, error = %err, "filter condition failed; dropping item");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::{ctx, input, node};
    use crate::NodeKind;
    use serde_json::json;

    #[tokio::test]
    async fn keeps_matching_items_per_source() {
        let out = FilterNode
            .execute(
                &node(NodeKind::Filter, json!({ "condition": "item.id < 3" })),
                input(json!({
                    "users": { "status_code": 200, "data": [{ "id": 1 }, { "id": 5 }, { "id": 2 }, "junk"] },
                    "meta": { "count": 3 },
                })),
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(
            out,
            json!({
                "users": [{ "id": 1 }, { "id": 2 }],
                "meta": { "count": 3 },
            })
        );
    }

    #[tokio::test]
    async fn missing_condition_passes_input_through() {
        let out = FilterNode
            .execute(&node(NodeKind::Filter, json!({})), input(json!({ "a": [1, 2] })), &ctx())
            .await
            .unwrap();
        assert_eq!(out, json!({ "a": [1, 2] }));
    }

    #[tokio::test]
    async fn invalid_condition_is_a_node_error() {
        let err = FilterNode
            .execute(&node(NodeKind::Filter, json!({ "condition": "item.id <" })), input(json!({})), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Expression(_)));
    }
}
