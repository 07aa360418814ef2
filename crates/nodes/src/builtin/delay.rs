use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::{ExecutableNode, ExecutionContext, NodeDefinition, NodeError, NodeInput};

/// Sleeps for `config.delay` seconds, then passes its input through.
#[derive(Debug, Default, Clone)]
pub struct DelayNode;

fn delay_seconds(node: &NodeDefinition) -> Result<f64, NodeError> {
    let invalid = |message: String| NodeError::InvalidConfig {
        field: "delay",
        message,
    };
    let seconds = match node.config_field("delay") {
        None => 0.0,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| invalid(format!("{n} is not a number")))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("'{s}' is not a number")))?,
        Some(other) => return Err(invalid(format!("expected seconds, found {other}"))),
    };
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid(format!("{seconds} is not a non-negative duration")));
    }
    Ok(seconds)
}

#[async_trait]
impl ExecutableNode for DelayNode {
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let seconds = delay_seconds(node)?;
        info!(node_id = %node.id, seconds, "delaying");
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(Value::Object(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::{ctx, input, node};
    use crate::NodeKind;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn sleeps_then_passes_input_through() {
        let started = tokio::time::Instant::now();
        let out = DelayNode
            .execute(&node(NodeKind::Delay, json!({ "delay": "1.5" })), input(json!({ "a": 1 })), &ctx())
            .await
            .unwrap();
        assert_eq!(out, json!({ "a": 1 }));
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn missing_delay_defaults_to_zero() {
        let out = DelayNode
            .execute(&node(NodeKind::Delay, Value::Null), input(json!({})), &ctx())
            .await
            .unwrap();
        assert_eq!(out, json!({}));
    }

    #[tokio::test]
    async fn negative_delay_is_rejected() {
        let err = DelayNode
            .execute(&node(NodeKind::Delay, json!({ "delay": -1 })), input(json!({})), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidConfig { field: "delay", .. }));
    }
}
