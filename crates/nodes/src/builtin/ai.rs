use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::template::substitute;
use crate::{ExecutableNode, ExecutionContext, NodeDefinition, NodeError, NodeInput};

const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const PREVIEW_CHARS: usize = 30;

/// Simulated model call.
///
/// No inference happens: the node renders `config.prompt` against its input,
/// waits for the configured latency, and answers with a canned response and
/// a token estimate of one token per four characters.
#[derive(Debug, Clone)]
pub struct AiNode {
    latency: Duration,
}

impl AiNode {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for AiNode {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl ExecutableNode for AiNode {
    async fn execute(
        &self,
        node: &NodeDefinition,
        input: NodeInput,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let model = node.config_str("model").unwrap_or(DEFAULT_MODEL);
        let prompt = substitute(node.config_str("prompt").unwrap_or(""), &Value::Object(input));
        let prompt_chars = prompt.chars().count();

        info!(node_id = %node.id, model, prompt_chars, "simulated AI request");
        tokio::time::sleep(self.latency).await;

        let preview: String = prompt.chars().take(PREVIEW_CHARS).collect();
        Ok(json!({
            "model": model,
            "prompt": prompt,
            "response": format!("AI response to prompt: {preview}..."),
            "tokens": prompt_chars / 4,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::{ctx, input, node};
    use crate::NodeKind;

    #[tokio::test]
    async fn renders_prompt_and_estimates_tokens() {
        let ai = AiNode::new(Duration::ZERO);
        let out = ai
            .execute(
                &node(NodeKind::Ai, json!({ "prompt": "Summarise {{src.title}} please" })),
                input(json!({ "src": { "title": "the quarterly report" } })),
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(out["model"], DEFAULT_MODEL);
        assert_eq!(out["prompt"], "Summarise the quarterly report please");
        assert_eq!(out["tokens"], 37 / 4);
        assert_eq!(
            out["response"],
            "AI response to prompt: Summarise the quarterly repor..."
        );
    }

    #[tokio::test]
    async fn empty_prompt_costs_nothing() {
        let out = AiNode::new(Duration::ZERO)
            .execute(&node(NodeKind::Ai, json!({ "model": "local" })), input(json!({})), &ctx())
            .await
            .unwrap();
        assert_eq!(out["model"], "local");
        assert_eq!(out["tokens"], 0);
    }
}
