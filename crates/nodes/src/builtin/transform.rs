use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::first_input;
use crate::template::resolve_path;
use crate::{ExecutableNode, ExecutionContext, NodeDefinition, NodeError, NodeInput};

/// Reshapes the first input through `config.mapping` (`targetKey → path`).
///
/// Paths that do not resolve, or that resolve to `null`, are left out of
/// the output. The result is
/// wrapped in a `{"data": ..}` envelope so downstream nodes unwrap it the
/// same way they unwrap an HTTP response.
#[derive(Debug, Default, Clone)]
pub struct TransformNode;

#[async_trait]
impl ExecutableNode for TransformNode {
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let mapping = match node.config_field("mapping") {
            None => return Ok(Value::Object(input)),
            Some(Value::Object(mapping)) if mapping.is_empty() => return Ok(Value::Object(input)),
            Some(Value::Object(mapping)) => mapping,
            Some(other) => {
                return Err(NodeError::InvalidConfig {
                    field: "mapping",
                    message: format!("expected an object of target -> path, found {other}"),
                })
            }
        };

        let source = first_input(&input);
        let mut transformed = Map::new();
        for (target, path) in mapping {
            let Some(path) = path.as_str() else {
                return Err(NodeError::InvalidConfig {
                    field: "mapping",
                    message: format!("path for '{target}' must be a string"),
                });
            };
            match resolve_path(&source, path) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    transformed.insert(target.clone(), value.clone());
                }
            }
        }

        Ok(json!({ "data": transformed }))
    }
}
