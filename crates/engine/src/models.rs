//! Workflow definitions as accepted from callers.
//!
//! A workflow is a flat node list plus a flat edge list; the graph view is
//! derived from them per run (see [`crate::dag`]).

use serde::{Deserialize, Serialize};

pub use nodes::{NodeDefinition, NodeKind};

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed data dependency: `target` runs after `source` and receives its
/// output keyed by `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition.
///
/// `connections` is accepted as an alias for `edges`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default, alias = "connections")]
    pub edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Self {
        Self {
            name: None,
            nodes,
            edges,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_connections_alias_and_missing_config() {
        let wf: Workflow = serde_json::from_value(json!({
            "nodes": [
                { "id": "a", "type": "http", "config": { "url": "http://x" } },
                { "id": "b", "type": "browser_automation" },
            ],
            "connections": [{ "source": "a", "target": "b" }],
        }))
        .unwrap();

        assert_eq!(wf.name, None);
        assert_eq!(wf.nodes[0].kind, NodeKind::Http);
        assert_eq!(wf.nodes[1].kind, NodeKind::Other("browser_automation".into()));
        assert!(wf.nodes[1].config.is_null());
        assert_eq!(wf.edges, vec![Edge::new("a", "b")]);
    }

    #[test]
    fn empty_document_is_an_empty_workflow() {
        let wf: Workflow = serde_json::from_str("{}").unwrap();
        assert!(wf.nodes.is_empty());
        assert!(wf.edges.is_empty());
    }
}
