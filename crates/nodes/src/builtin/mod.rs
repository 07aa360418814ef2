//! Built-in node handlers, one per [`crate::NodeKind`] variant.
//!
//! Every handler takes `(node, input)` and returns either a structured
//! output or a [`crate::NodeError`]; the engine turns the latter into an
//! `{"error": ..}` payload so no failure escapes a single node.

mod ai;
mod conditional;
mod delay;
mod filter;
mod function;
mod http;
mod transform;
mod unknown;

pub use ai::AiNode;
pub use conditional::ConditionalNode;
pub use delay::DelayNode;
pub use filter::FilterNode;
pub use function::FunctionNode;
pub use http::HttpNode;
pub use transform::TransformNode;
pub use unknown::UnknownNode;

use serde_json::{Map, Value};

use crate::NodeInput;

/// Strip one `{"data": ..}` envelope, as produced by `http` and `transform`.
pub(crate) fn unwrap_envelope(value: &Value) -> &Value {
    match value {
        Value::Object(map) => map.get("data").unwrap_or(value),
        other => other,
    }
}

/// The unwrapped value of the first input source, or `{}` when there is none.
///
/// Only the first source is consulted; additional inputs are ignored.
pub(crate) fn first_input(input: &NodeInput) -> Value {
    input
        .values()
        .next()
        .map(|value| unwrap_envelope(value).clone())
        .unwrap_or_else(|| Value::Object(Map::new()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::Value;

    use crate::{ExecutionContext, NodeDefinition, NodeInput, NodeKind};

    pub fn node(kind: NodeKind, config: Value) -> NodeDefinition {
        NodeDefinition::new("n1", kind, config)
    }

    pub fn input(value: Value) -> NodeInput {
        match value {
            Value::Object(map) => map,
            other => panic!("test input must be an object, got {other}"),
        }
    }

    pub fn ctx() -> ExecutionContext {
        ExecutionContext::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_is_unwrapped_once() {
        assert_eq!(unwrap_envelope(&json!({ "data": { "data": 1 } })), &json!({ "data": 1 }));
        assert_eq!(unwrap_envelope(&json!([1])), &json!([1]));
    }

    #[test]
    fn first_input_defaults_to_empty_object() {
        assert_eq!(first_input(&NodeInput::new()), json!({}));
        let input = test_support::input(json!({ "a": { "data": [1] }, "b": 2 }));
        assert_eq!(first_input(&input), json!([1]));
    }
}
