// SPDX-License-Identifier: MIT

//! Map-reduce pattern nodes

use serde_json::Value;

use crate::engine::node::{BatchNode, Node, Outcome, NEXT};
use crate::engine::state::SharedState;
use crate::error::StageError;

/// Per-item mapping function.
pub type MapFn = Box<dyn Fn(&Value) -> Result<Value, StageError> + Send + Sync>;
/// Whole-list reduction function.
pub type ReduceFn = Box<dyn Fn(&[Value]) -> Result<Value, StageError> + Send + Sync>;

fn require_list(shared: &SharedState, key: &str) -> Result<Vec<Value>, StageError> {
    let value = shared
        .get(key)
        .ok_or_else(|| StageError::MissingKey(key.to_string()))?;
    value
        .as_array()
        .cloned()
        .ok_or_else(|| StageError::NotAList(key.to_string()))
}

/// Batch node that applies a caller function to each element of the list
/// under the input key, storing the mapped list under the output key.
pub struct MapNode {
    name: String,
    map_fn: MapFn,
    input_key: String,
    output_key: String,
}

impl MapNode {
    pub fn new(map_fn: impl Fn(&Value) -> Result<Value, StageError> + Send + Sync + 'static) -> Self {
        Self {
            name: "map".to_string(),
            map_fn: Box::new(map_fn),
            input_key: "items".to_string(),
            output_key: "mapped_items".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = key.into();
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }
}

impl BatchNode for MapNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn prep(&self, shared: &mut SharedState) -> Result<Vec<Value>, StageError> {
        require_list(shared, &self.input_key)
    }

    fn exec_item(&self, item: Value) -> Result<Value, StageError> {
        (self.map_fn)(&item)
    }

    fn post(
        &self,
        shared: &mut SharedState,
        _items: &[Value],
        results: Vec<Value>,
    ) -> Result<Outcome, StageError> {
        shared.set(self.output_key.clone(), Value::Array(results));
        Ok(NEXT.to_string())
    }
}

/// Node that reduces the list under the input key to a single value stored
/// under the output key.
pub struct ReduceNode {
    name: String,
    reduce_fn: ReduceFn,
    input_key: String,
    output_key: String,
}

impl ReduceNode {
    pub fn new(
        reduce_fn: impl Fn(&[Value]) -> Result<Value, StageError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: "reduce".to_string(),
            reduce_fn: Box::new(reduce_fn),
            input_key: "mapped_items".to_string(),
            output_key: "reduced_result".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = key.into();
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }
}

impl Node for ReduceNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        Ok(Value::Array(require_list(shared, &self.input_key)?))
    }

    fn exec(&self, input: Value) -> Result<Value, StageError> {
        let items = input.as_array().cloned().unwrap_or_default();
        (self.reduce_fn)(&items)
    }

    fn post(
        &self,
        shared: &mut SharedState,
        _prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        shared.set(self.output_key.clone(), exec);
        Ok(NEXT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::flow::Flow;
    use crate::engine::node::NodeHandle;
    use serde_json::json;

    fn double(value: &Value) -> Result<Value, StageError> {
        Ok(json!(value.as_i64().unwrap_or(0) * 2))
    }

    fn sum(items: &[Value]) -> Result<Value, StageError> {
        Ok(json!(items.iter().filter_map(Value::as_i64).sum::<i64>()))
    }

    #[test]
    fn test_map_then_reduce_flow() {
        let map = NodeHandle::batch(MapNode::new(double));
        let reduce = NodeHandle::new(ReduceNode::new(sum));
        map.then(&reduce);

        let mut shared = SharedState::new();
        shared.set("items", json!([1, 2, 3, 4]));

        let result = Flow::new(map).with_name("map_reduce").run(&shared);

        assert_eq!(result.get("mapped_items"), Some(&json!([2, 4, 6, 8])));
        assert_eq!(result.get_i64("reduced_result"), Some(20));
    }

    #[test]
    fn test_map_node_missing_input_faults() {
        let node = NodeHandle::batch(MapNode::new(double));
        let mut state = SharedState::new();

        let err = node.run(&mut state).unwrap_err();
        assert!(matches!(err, StageError::MissingKey(key) if key == "items"));
    }

    #[test]
    fn test_reduce_node_rejects_non_list() {
        let node = NodeHandle::new(ReduceNode::new(sum).with_input_key("scalar"));
        let mut state = SharedState::new();
        state.set("scalar", 7);

        let err = node.run(&mut state).unwrap_err();
        assert!(matches!(err, StageError::NotAList(key) if key == "scalar"));
    }

    #[test]
    fn test_map_empty_list_yields_empty_results() {
        let node = NodeHandle::batch(MapNode::new(double));
        let mut state = SharedState::new();
        state.set("items", json!([]));

        node.run(&mut state).unwrap();
        assert_eq!(state.get("mapped_items"), Some(&json!([])));
    }
}
