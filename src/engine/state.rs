// SPDX-License-Identifier: MIT

//! Shared-state blackboard passed through one flow run

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Reserved key: true iff the run ended because no current node remained
/// and no fault went unrecovered.
pub const KEY_COMPLETED: &str = "_flow_completed";
/// Reserved key: number of steps the run executed.
pub const KEY_STEPS: &str = "_flow_steps";
/// Reserved key: ordered list of visited node names.
pub const KEY_EXECUTION_PATH: &str = "_flow_execution_path";
/// Reserved key: true iff the run ended because the step budget ran out.
pub const KEY_MAX_STEPS_REACHED: &str = "_flow_max_steps_reached";
/// Reserved key: message of the most recent stage fault.
pub const KEY_ERROR: &str = "error";
/// Reserved key: name of the node whose stage faulted.
pub const KEY_ERROR_NODE: &str = "error_node";

/// Mutable key-value blackboard shared by the nodes of one flow run.
///
/// Keys are strings, values are arbitrary JSON. Cloning copies the key map;
/// values are owned JSON trees, so a clone can never alias nested structures
/// with the original. This is the copy semantics behind copy-on-run flows
/// and the independent branch states of the parallel composite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedState {
    fields: HashMap<String, Value>,
}

impl SharedState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from a JSON object; anything else yields an empty state
    pub fn from_json(value: &Value) -> Self {
        let fields = match value {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => HashMap::new(),
        };
        Self { fields }
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a value as an integer
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    /// Get a value as a string slice
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Get a value as a bool
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    /// Get a value as a list
    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.fields.get(key).and_then(Value::as_array)
    }

    /// Set a value, overwriting any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// All keys
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// All entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the state is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy every entry of `other` into this state, overwriting on key
    /// collision (last write wins).
    ///
    /// The copy is shallow over the key map: values are cloned as owned JSON
    /// trees, so the two states share nothing afterwards. This is the single
    /// merge-back point for the parallel, loop, and sequential composites.
    pub fn merge_from(&mut self, other: &SharedState) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Convert the state to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }
}

impl FromIterator<(String, Value)> for SharedState {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Record of one flow run: the visited path, the step counter, and the two
/// termination flags. Written into shared state under the reserved keys when
/// a run finishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTrace {
    pub path: Vec<String>,
    pub steps: usize,
    pub completed: bool,
    pub max_steps_reached: bool,
}

impl ExecutionTrace {
    /// Write the trace into shared state under the reserved keys
    pub fn record(&self, state: &mut SharedState) {
        state.set(KEY_COMPLETED, self.completed);
        state.set(KEY_STEPS, self.steps as u64);
        state.set(
            KEY_EXECUTION_PATH,
            Value::Array(self.path.iter().cloned().map(Value::String).collect()),
        );
        state.set(KEY_MAX_STEPS_REACHED, self.max_steps_reached);
    }

    /// Read a trace back from shared state, defaulting absent keys
    pub fn from_state(state: &SharedState) -> Self {
        let path = state
            .get_array(KEY_EXECUTION_PATH)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            path,
            steps: state.get_i64(KEY_STEPS).unwrap_or(0) as usize,
            completed: state.get_bool(KEY_COMPLETED).unwrap_or(false),
            max_steps_reached: state.get_bool(KEY_MAX_STEPS_REACHED).unwrap_or(false),
        }
    }
}
