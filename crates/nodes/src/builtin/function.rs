use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::expr::{Program, Vars};
use crate::{ExecutableNode, ExecutionContext, NodeDefinition, NodeError, NodeInput};

const DEFAULT_LANGUAGE: &str = "expression";

/// Runs `config.code` in the sandboxed expression language.
///
/// The program sees its input as `input_data` (alias `input`) and returns
/// whatever it leaves in `result`, which starts out as `{}`.
#[derive(Debug, Default, Clone)]
pub struct FunctionNode;

#[async_trait]
impl ExecutableNode for FunctionNode {
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let code = node.config_str("code").unwrap_or("");
        if code.trim().is_empty() {
            return Err(NodeError::InvalidConfig {
                field: "code",
                message: "no code provided".into(),
            });
        }

        let language = node
            .config_str("language")
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_lowercase();
        if !matches!(language.as_str(), "expression" | "expr") {
            return Err(NodeError::Unsupported(format!("unsupported language: {language}")));
        }

        let program = Program::compile(code)?;

        let input = Value::Object(input);
        let mut vars = Vars::new();
        vars.insert("input".to_owned(), input.clone());
        vars.insert("input_data".to_owned(), input);
        vars.insert("result".to_owned(), Value::Object(Map::new()));

        let mut vars = program.run(vars)?;
        debug!(node_id = %node.id, "function program finished");
        Ok(vars.remove("result").unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::{ctx, input, node};
    use crate::NodeKind;
    use serde_json::json;

    #[tokio::test]
    async fn returns_the_result_variable() {
        let code = "prices = map(input_data.cart.items, i => i.price)\n\
                    result = {'total': sum(prices), 'max': max(prices)}";
        let out = FunctionNode
            .execute(
                &node(NodeKind::Function, json!({ "code": code })),
                input(json!({ "cart": { "items": [{ "price": 4 }, { "price": 6 }] } })),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({ "total": 10, "max": 6 }));
    }

    #[tokio::test]
    async fn untouched_result_is_empty_object() {
        let out = FunctionNode
            .execute(&node(NodeKind::Function, json!({ "code": "log(len(input))" })), input(json!({})), &ctx())
            .await
            .unwrap();
        assert_eq!(out, json!({}));
    }

    #[tokio::test]
    async fn other_languages_are_unsupported() {
        let err = FunctionNode
            .execute(
                &node(NodeKind::Function, json!({ "code": "result = 1", "language": "Python" })),
                input(json!({})),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported language: python");
    }

    #[tokio::test]
    async fn missing_code_is_rejected() {
        let err = FunctionNode
            .execute(&node(NodeKind::Function, json!({})), input(json!({})), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig { field: "code", .. }));
    }
}
