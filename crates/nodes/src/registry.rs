//! Lookup table from [`NodeKind`] to handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::builtin::{
    AiNode, ConditionalNode, DelayNode, FilterNode, FunctionNode, HttpNode, TransformNode,
    UnknownNode,
};
use crate::{ExecutableNode, NodeKind};

/// Maps node kinds to the handler that runs them.
///
/// Lookups never fail: a kind with no registered handler resolves to
/// [`UnknownNode`], which reports the kind back in its output. The registry
/// is built once and then shared read-only by every run.
#[derive(Clone)]
pub struct NodeRegistry {
    handlers: HashMap<NodeKind, Arc<dyn ExecutableNode>>,
    fallback: Arc<dyn ExecutableNode>,
}

impl NodeRegistry {
    /// A registry with no handlers; everything resolves to the fallback.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(UnknownNode),
        }
    }

    /// A registry with all seven built-in kinds registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(NodeKind::Http, Arc::new(HttpNode::new()));
        registry.register(NodeKind::Function, Arc::new(FunctionNode));
        registry.register(NodeKind::Ai, Arc::new(AiNode::default()));
        registry.register(NodeKind::Filter, Arc::new(FilterNode));
        registry.register(NodeKind::Transform, Arc::new(TransformNode));
        registry.register(NodeKind::Delay, Arc::new(DelayNode));
        registry.register(NodeKind::Conditional, Arc::new(ConditionalNode));
        registry
    }

    /// Register `handler` for `kind`, replacing any previous handler.
    ///
    /// This is also how externally supplied handlers (browser automation and
    /// the like) are plugged in under a [`NodeKind::Other`] tag.
    pub fn register(&mut self, kind: impl Into<NodeKind>, handler: Arc<dyn ExecutableNode>) -> &mut Self {
        let kind = kind.into();
        debug!(%kind, "registering node handler");
        self.handlers.insert(kind, handler);
        self
    }

    /// The handler for `kind`, or the unknown-type fallback.
    pub fn resolve(&self, kind: &NodeKind) -> Arc<dyn ExecutableNode> {
        self.handlers
            .get(kind)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn contains(&self, kind: &NodeKind) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(NodeKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("NodeRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;
    use crate::{ExecutionContext, NodeDefinition};
    use serde_json::json;

    #[test]
    fn builtins_cover_every_closed_kind() {
        let registry = NodeRegistry::with_builtins();
        assert_eq!(registry.len(), 7);
        for tag in ["http", "function", "ai", "filter", "transform", "delay", "conditional"] {
            assert!(registry.contains(&NodeKind::from(tag)), "missing {tag}");
        }
        assert!(!registry.contains(&NodeKind::from("browser_automation")));
    }

    #[tokio::test]
    async fn unregistered_kind_resolves_to_fallback() {
        let registry = NodeRegistry::empty();
        let node = NodeDefinition::new("x", "mystery", json!({}));
        let out = registry
            .resolve(&node.kind)
            .execute(&node, Default::default(), &ExecutionContext::new(None))
            .await
            .unwrap();
        assert_eq!(out["error"], "unsupported node type: mystery");
    }

    #[tokio::test]
    async fn external_handlers_register_under_custom_tags() {
        let mock = Arc::new(MockNode::returning(json!({ "screenshot": "ok" })));
        let mut registry = NodeRegistry::with_builtins();
        registry.register("browser_automation", mock.clone());

        let node = NodeDefinition::new("b", "browser_automation", json!({}));
        let out = registry
            .resolve(&node.kind)
            .execute(&node, Default::default(), &ExecutionContext::new(None))
            .await
            .unwrap();

        assert_eq!(out, json!({ "screenshot": "ok" }));
        assert_eq!(mock.call_count_for("b"), 1);
    }
}
