//! Write-once result table for a single run.

use serde_json::{Map, Value};

use nodes::NodeInput;

use crate::EngineError;

/// Key under which the caller's seed is handed to nodes with no executed
/// upstream.
pub const WORKFLOW_INPUT_KEY: &str = "workflow_input";

/// Node id → output for one run, plus the optional caller seed.
///
/// Each id is written exactly once. Only the orchestrating loop writes here;
/// handlers and spawned tasks hand their output back instead.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    results: Map<String, Value>,
    workflow_input: Option<Value>,
}

impl ResultStore {
    pub fn new(workflow_input: Option<Value>) -> Self {
        Self {
            results: Map::new(),
            workflow_input,
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.results.contains_key(node_id)
    }

    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.results.get(node_id)
    }

    /// Store the output of `node_id`.
    ///
    /// # Errors
    /// [`EngineError::DuplicateResult`] if the id already has a result; the
    /// stored value is left untouched.
    pub fn record(&mut self, node_id: &str, output: Value) -> Result<(), EngineError> {
        if self.results.contains_key(node_id) {
            return Err(EngineError::DuplicateResult(node_id.to_owned()));
        }
        self.results.insert(node_id.to_owned(), output);
        Ok(())
    }

    /// Input for a node whose incoming edges come from `upstream`.
    ///
    /// Holds every upstream that already has a result, in edge order. When
    /// none has, falls back to `{"workflow_input": seed}` if a seed exists,
    /// otherwise an empty map.
    pub fn input_for(&self, upstream: &[&str]) -> NodeInput {
        let mut input = NodeInput::new();
        for &source in upstream {
            if let Some(output) = self.results.get(source) {
                input
                    .entry(source.to_owned())
                    .or_insert_with(|| output.clone());
            }
        }

        if input.is_empty() {
            if let Some(seed) = &self.workflow_input {
                input.insert(WORKFLOW_INPUT_KEY.to_owned(), seed.clone());
            }
        }
        input
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results in the order they were recorded.
    pub fn into_results(self) -> Map<String, Value> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_is_write_once() {
        let mut store = ResultStore::new(None);
        store.record("a", json!(1)).unwrap();
        assert_eq!(
            store.record("a", json!(2)),
            Err(EngineError::DuplicateResult("a".into()))
        );
        assert_eq!(store.get("a"), Some(&json!(1)));
    }

    #[test]
    fn input_uses_executed_upstreams_in_edge_order() {
        let mut store = ResultStore::new(Some(json!({ "seed": true })));
        store.record("c", json!("c-out")).unwrap();
        store.record("b", json!("b-out")).unwrap();

        let input = store.input_for(&["b", "missing", "c", "b"]);
        assert_eq!(input.keys().collect::<Vec<_>>(), ["b", "c"]);
        assert_eq!(input["b"], "b-out");
    }

    #[test]
    fn seed_is_the_fallback_input() {
        let store = ResultStore::new(Some(json!({ "seed": true })));
        let input = store.input_for(&["not-yet"]);
        assert_eq!(Value::Object(input), json!({ "workflow_input": { "seed": true } }));

        assert!(ResultStore::new(None).input_for(&[]).is_empty());
    }

    #[test]
    fn node_named_workflow_input_does_not_clash_with_seed() {
        let mut store = ResultStore::new(Some(json!("seed")));
        store.record(WORKFLOW_INPUT_KEY, json!("node output")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.input_for(&[WORKFLOW_INPUT_KEY])[WORKFLOW_INPUT_KEY], "node output");
    }
}
