//! Dependency graph built once per run from the flat node and edge lists.
//!
//! Rules applied while building:
//! 1. Duplicate node ids: the first definition wins.
//! 2. Edges with an empty endpoint are ignored.
//! 3. Edges whose `target` is not a known node are dropped.
//! 4. Edges whose `source` is not a known node are kept; the missing source
//!    becomes an entry point that the executor records as a node error.
//!
//! The graph borrows ids from the workflow, so it never outlives it.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use crate::models::{Edge, NodeDefinition};
use crate::EngineError;

#[derive(Debug, Clone)]
pub struct DependencyGraph<'w> {
    nodes: HashMap<&'w str, &'w NodeDefinition>,
    /// Every vertex: node ids in node order, then missing sources in edge order.
    vertices: Vec<&'w str>,
    downstream: HashMap<&'w str, Vec<&'w str>>,
    upstream: HashMap<&'w str, Vec<&'w str>>,
    entries: Vec<&'w str>,
    dangling: Vec<&'w Edge>,
}

impl<'w> DependencyGraph<'w> {
    pub fn build(nodes: &'w [NodeDefinition], edges: &'w [Edge]) -> Self {
        // -------------------------------------------------------------------
        // 1. Index nodes by id
        // -------------------------------------------------------------------
        let mut by_id: HashMap<&'w str, &'w NodeDefinition> = HashMap::with_capacity(nodes.len());
        let mut vertices: Vec<&'w str> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if by_id.contains_key(node.id.as_str()) {
                warn!(node_id = %node.id, "duplicate node id; keeping the first definition");
                continue;
            }
            by_id.insert(node.id.as_str(), node);
            vertices.push(node.id.as_str());
        }

        // -------------------------------------------------------------------
        // 2. Wire edges
        // -------------------------------------------------------------------
        let mut downstream: HashMap<&'w str, Vec<&'w str>> = HashMap::new();
        let mut upstream: HashMap<&'w str, Vec<&'w str>> = HashMap::new();
        let mut dangling = Vec::new();
        let mut missing_sources: Vec<&'w str> = Vec::new();

        for edge in edges {
            let (source, target) = (edge.source.as_str(), edge.target.as_str());
            if source.is_empty() || target.is_empty() {
                continue;
            }
            if !by_id.contains_key(target) {
                warn!(source, target, "edge targets an unknown node; dropping it");
                dangling.push(edge);
                continue;
            }
            if !by_id.contains_key(source) && !missing_sources.contains(&source) {
                missing_sources.push(source);
            }
            downstream.entry(source).or_default().push(target);
            upstream.entry(target).or_default().push(source);
        }
        vertices.extend(missing_sources);

        // -------------------------------------------------------------------
        // 3. Entry points: vertices no kept edge points at
        // -------------------------------------------------------------------
        let entries = vertices
            .iter()
            .copied()
            .filter(|id| !upstream.contains_key(id))
            .collect();

        Self {
            nodes: by_id,
            vertices,
            downstream,
            upstream,
            entries,
            dangling,
        }
    }

    /// The definition for `id`, or `None` for a missing source.
    pub fn node(&self, id: &str) -> Option<&'w NodeDefinition> {
        self.nodes.get(id).copied()
    }

    /// Targets of `id`'s outgoing edges, in edge order.
    pub fn downstream(&self, id: &str) -> &[&'w str] {
        self.downstream.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sources of `id`'s incoming edges, in edge order.
    pub fn upstream(&self, id: &str) -> &[&'w str] {
        self.upstream.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry_nodes(&self) -> &[&'w str] {
        &self.entries
    }

    /// Edges dropped because their target does not exist.
    pub fn dangling_edges(&self) -> &[&'w Edge] {
        &self.dangling
    }

    /// Sources referenced by edges but absent from the node list.
    pub fn missing_sources(&self) -> impl Iterator<Item = &'w str> + '_ {
        self.vertices
            .iter()
            .copied()
            .filter(|id| !self.nodes.contains_key(id))
    }

    pub fn vertices(&self) -> &[&'w str] {
        &self.vertices
    }

    /// Every vertex reachable from an entry point, in breadth-first order.
    pub fn reachable(&self) -> Vec<&'w str> {
        let mut seen: HashSet<&'w str> = self.entries.iter().copied().collect();
        let mut order: Vec<&'w str> = self.entries.clone();
        let mut queue: VecDeque<&'w str> = self.entries.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            for &child in self.downstream(id) {
                if seen.insert(child) {
                    order.push(child);
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// For each vertex in `reachable`, the number of distinct upstream
    /// sources that are themselves reachable and so will eventually produce
    /// a result.
    pub fn pending_upstream_counts(&self, reachable: &[&'w str]) -> HashMap<&'w str, usize> {
        let reachable_set: HashSet<&str> = reachable.iter().copied().collect();
        reachable
            .iter()
            .map(|&id| {
                let sources: HashSet<&str> = self
                    .upstream(id)
                    .iter()
                    .copied()
                    .filter(|source| reachable_set.contains(source))
                    .collect();
                (id, sources.len())
            })
            .collect()
    }

    /// Mark `id` as finished: decrement the pending count of each distinct
    /// child and return the children that just became ready, in edge order.
    pub fn release(&self, id: &str, pending: &mut HashMap<&'w str, usize>) -> Vec<&'w str> {
        let mut seen = HashSet::new();
        let mut ready = Vec::new();
        for &child in self.downstream(id) {
            if !seen.insert(child) {
                continue;
            }
            if let Some(count) = pending.get_mut(child) {
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(child);
                    }
                }
            }
        }
        ready
    }

    /// Topological order of every vertex (Kahn's algorithm).
    ///
    /// # Errors
    /// [`EngineError::CycleDetected`] naming the first vertex, in vertex
    /// order, that could not be placed.
    pub fn topological_order(&self) -> Result<Vec<&'w str>, EngineError> {
        let mut in_degree: HashMap<&str, usize> =
            self.vertices.iter().map(|&id| (id, 0)).collect();
        for targets in self.downstream.values() {
            for &target in targets {
                *in_degree.entry(target).or_insert(0) += 1;
            }
        }

        // Seed the queue with vertices that have no incoming edges.
        let mut queue: VecDeque<&'w str> = self
            .vertices
            .iter()
            .copied()
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut sorted: Vec<&'w str> = Vec::with_capacity(self.vertices.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id);
            for &child in self.downstream(id) {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        // If we didn't place every vertex the graph contains a cycle.
        if sorted.len() != self.vertices.len() {
            let stuck = self
                .vertices
                .iter()
                .find(|id| in_degree[*id] > 0)
                .copied()
                .unwrap_or_default();
            return Err(EngineError::CycleDetected {
                node_id: stuck.to_owned(),
            });
        }

        Ok(sorted)
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn make_nodes(ids: &[&str]) -> Vec<NodeDefinition> {
        ids.iter()
            .map(|id| NodeDefinition::new(*id, "mock", Value::Null))
            .collect()
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<Edge> {
        pairs.iter().map(|(s, t)| Edge::new(*s, *t)).collect()
    }

    #[test]
    fn adjacency_keeps_edge_order() {
        let nodes = make_nodes(&["a", "b", "c"]);
        let edges = edges(&[("a", "c"), ("a", "b"), ("b", "c")]);
        let graph = DependencyGraph::build(&nodes, &edges);

        assert_eq!(graph.downstream("a"), ["c", "b"]);
        assert_eq!(graph.upstream("c"), ["a", "b"]);
        assert_eq!(graph.entry_nodes(), ["a"]);
        assert!(graph.downstream("c").is_empty());
    }

    #[test]
    fn independent_entry_points_follow_node_order() {
        let nodes = make_nodes(&["z", "y", "x"]);
        let edges = edges(&[("y", "x")]);
        let graph = DependencyGraph::build(&nodes, &edges);
        assert_eq!(graph.entry_nodes(), ["z", "y"]);
    }

    #[test]
    fn dangling_target_is_dropped() {
        let nodes = make_nodes(&["a"]);
        let edges = edges(&[("a", "ghost")]);
        let graph = DependencyGraph::build(&nodes, &edges);

        assert!(graph.downstream("a").is_empty());
        assert_eq!(graph.dangling_edges().len(), 1);
        assert_eq!(graph.dangling_edges()[0].target, "ghost");
    }

    #[test]
    fn missing_source_becomes_a_trailing_entry() {
        let nodes = make_nodes(&["y", "solo"]);
        let edges = edges(&[("x", "y")]);
        let graph = DependencyGraph::build(&nodes, &edges);

        assert_eq!(graph.entry_nodes(), ["solo", "x"]);
        assert!(graph.node("x").is_none());
        assert_eq!(graph.missing_sources().collect::<Vec<_>>(), ["x"]);
        assert_eq!(graph.downstream("x"), ["y"]);
    }

    #[test]
    fn duplicate_node_id_keeps_first() {
        let nodes = vec![
            NodeDefinition::new("a", "http", Value::Null),
            NodeDefinition::new("a", "delay", Value::Null),
        ];
        let graph = DependencyGraph::build(&nodes, &[]);
        assert_eq!(graph.vertices(), ["a"]);
        assert_eq!(graph.node("a").unwrap().kind.as_str(), "http");
    }

    #[test]
    fn empty_endpoints_are_ignored() {
        let nodes = make_nodes(&["a"]);
        let edges = edges(&[("", "a"), ("a", "")]);
        let graph = DependencyGraph::build(&nodes, &edges);
        assert_eq!(graph.entry_nodes(), ["a"]);
        assert!(graph.dangling_edges().is_empty());
    }

    #[test]
    fn valid_diamond_sorts_with_a_first_and_d_last() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let nodes = make_nodes(&["a", "b", "c", "d"]);
        let edges = edges(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        let graph = DependencyGraph::build(&nodes, &edges);

        let sorted = graph.topological_order().expect("should be valid");
        assert_eq!(sorted, ["a", "b", "c", "d"]);

        let reachable = graph.reachable();
        let mut pending = graph.pending_upstream_counts(&reachable);
        assert_eq!(pending["d"], 2);
        assert_eq!(graph.release("a", &mut pending), ["b", "c"]);
        assert!(graph.release("b", &mut pending).is_empty());
        assert_eq!(graph.release("c", &mut pending), ["d"]);
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → B  (cycle!)
        let nodes = make_nodes(&["a", "b", "c"]);
        let edges = edges(&[("a", "b"), ("b", "c"), ("c", "b")]);
        let graph = DependencyGraph::build(&nodes, &edges);

        assert_eq!(
            graph.topological_order(),
            Err(EngineError::CycleDetected { node_id: "b".into() })
        );
    }

    #[test]
    fn pure_cycle_has_no_entry_nodes() {
        let nodes = make_nodes(&["a", "b"]);
        let edges = edges(&[("a", "b"), ("b", "a")]);
        let graph = DependencyGraph::build(&nodes, &edges);
        assert!(graph.entry_nodes().is_empty());
        assert!(graph.reachable().is_empty());
    }

    #[test]
    fn unreachable_upstream_is_not_waited_for() {
        // e → n, and n is also fed by the unreachable cycle p ⇄ q.
        let nodes = make_nodes(&["e", "n", "p", "q"]);
        let edges = edges(&[("e", "n"), ("p", "q"), ("q", "p"), ("p", "n")]);
        let graph = DependencyGraph::build(&nodes, &edges);

        let reachable = graph.reachable();
        assert_eq!(reachable, ["e", "n"]);
        assert_eq!(graph.pending_upstream_counts(&reachable)["n"], 1);
    }

    #[test]
    fn repeated_edge_counts_once() {
        let nodes = make_nodes(&["a", "b"]);
        let edges = edges(&[("a", "b"), ("a", "b")]);
        let graph = DependencyGraph::build(&nodes, &edges);

        let reachable = graph.reachable();
        let mut pending = graph.pending_upstream_counts(&reachable);
        assert_eq!(pending["b"], 1);
        assert_eq!(graph.release("a", &mut pending), ["b"]);
        assert_eq!(graph.topological_order().unwrap(), ["a", "b"]);
    }
}
