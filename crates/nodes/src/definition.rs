//! Node definitions as supplied by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag selecting which handler runs a node.
///
/// The set of built-in kinds is closed; any other tag is kept verbatim in
/// [`NodeKind::Other`] so externally registered handlers (and the fallback
/// for unknown types) can still be looked up by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Http,
    Function,
    Ai,
    Filter,
    Transform,
    Delay,
    Conditional,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Http => "http",
            NodeKind::Function => "function",
            NodeKind::Ai => "ai",
            NodeKind::Filter => "filter",
            NodeKind::Transform => "transform",
            NodeKind::Delay => "delay",
            NodeKind::Conditional => "conditional",
            NodeKind::Other(tag) => tag,
        }
    }
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Other("unknown".to_owned())
    }
}

impl From<&str> for NodeKind {
    fn from(tag: &str) -> Self {
        match tag {
            "http" => NodeKind::Http,
            "function" => NodeKind::Function,
            "ai" => NodeKind::Ai,
            "filter" => NodeKind::Filter,
            "transform" => NodeKind::Transform,
            "delay" => NodeKind::Delay,
            "conditional" => NodeKind::Conditional,
            other => NodeKind::Other(other.to_owned()),
        }
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        NodeKind::from(tag.as_str())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    /// Selects the handler in the [`crate::NodeRegistry`].
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    /// Free-form handler configuration; each handler projects what it needs.
    #[serde(default)]
    pub config: Value,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, kind: impl Into<NodeKind>, config: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            config,
        }
    }

    /// Look up a config field. A `null` config behaves like an empty one.
    pub fn config_field(&self, key: &str) -> Option<&Value> {
        self.config.get(key).filter(|v| !v.is_null())
    }

    /// Look up a string config field, treating other types as absent.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config_field(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_tags_map_to_builtin_kinds() {
        assert_eq!(NodeKind::from("http"), NodeKind::Http);
        assert_eq!(NodeKind::from("conditional"), NodeKind::Conditional);
        assert_eq!(
            NodeKind::from("browserbase"),
            NodeKind::Other("browserbase".into())
        );
    }

    #[test]
    fn definition_deserializes_type_tag() {
        let node: NodeDefinition =
            serde_json::from_value(json!({ "id": "n1", "type": "delay", "config": { "delay": 1 } }))
                .expect("valid node");
        assert_eq!(node.kind, NodeKind::Delay);
        assert_eq!(node.config_field("delay"), Some(&json!(1)));
    }

    #[test]
    fn missing_type_and_config_use_defaults() {
        let node: NodeDefinition = serde_json::from_value(json!({ "id": "n1" })).expect("valid node");
        assert_eq!(node.kind.as_str(), "unknown");
        assert!(node.config_field("anything").is_none());
        assert_eq!(serde_json::to_value(&node).unwrap()["type"], "unknown");
    }
}
