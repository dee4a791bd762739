// SPDX-License-Identifier: MIT

//! Sequential sub-workflow composite

use serde_json::{json, Value};

use crate::engine::node::{Node, NodeHandle, Outcome, NEXT};
use crate::engine::state::SharedState;
use crate::error::{ConfigError, StageError};

/// Wraps an ordered node list as one atomic step.
///
/// The nodes are linked with `"next"` edges at construction (the usual
/// overwrite-on-duplicate wiring applies). Execution runs against a private
/// copy of shared state from the first node, stopping at the last node or at
/// the first node whose outcome is not `"next"`. The private state is then
/// merged back (last write wins) and the last-executed node's exec result is
/// stored under the configured output key.
pub struct SequentialNode {
    name: String,
    nodes: Vec<NodeHandle>,
    output_key: Option<String>,
}

impl SequentialNode {
    pub fn new(nodes: Vec<NodeHandle>) -> Result<Self, ConfigError> {
        if nodes.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        for pair in nodes.windows(2) {
            pair[0].connect(NEXT, &pair[1]);
        }
        Ok(Self {
            name: "sequential".to_string(),
            nodes,
            output_key: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Store the last-executed node's exec result under this key
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }
}

impl Node for SequentialNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        Ok(shared.to_json())
    }

    fn exec(&self, input: Value) -> Result<Value, StageError> {
        let mut private = SharedState::from_json(&input);
        let mut last_result = Value::Null;

        for node in &self.nodes {
            let (exec_result, outcome) = node.run_sync_stages(&mut private)?;
            last_result = exec_result;
            if outcome != NEXT {
                log::info!(
                    "sequential '{}': stopped at node '{}' on outcome '{}'",
                    self.name,
                    node.name(),
                    outcome
                );
                break;
            }
        }

        Ok(json!({ "state": private.to_json(), "result": last_result }))
    }

    fn post(
        &self,
        shared: &mut SharedState,
        _prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        shared.merge_from(&SharedState::from_json(&exec["state"]));
        if let Some(key) = &self.output_key {
            shared.set(key.clone(), exec["result"].clone());
        }
        Ok(NEXT.to_string())
    }
}
