// SPDX-License-Identifier: MIT

//! Tool-backed node

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::collab::Tool;
use crate::engine::async_node::AsyncNode;
use crate::engine::node::{Outcome, ERROR, NEXT};
use crate::engine::state::SharedState;
use crate::error::{CollabError, StageError};
use crate::nodes::ErrorHandling;

/// Node that invokes one declared tool method with arguments mapped from
/// shared state.
///
/// The method name is checked against the tool's contract when the node is
/// built, so a misconfigured node is rejected before anything runs. The
/// outcome is the configured success or error label; the result, metadata,
/// and success flag land under `{result_key}`-prefixed keys either way.
pub struct ToolNode {
    name: String,
    tool: Arc<dyn Tool>,
    method: String,
    arg_mapping: HashMap<String, String>,
    result_key: String,
    error_handling: ErrorHandling,
    success_outcome: Outcome,
    error_outcome: Outcome,
}

impl std::fmt::Debug for ToolNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolNode")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("arg_mapping", &self.arg_mapping)
            .field("result_key", &self.result_key)
            .field("error_handling", &self.error_handling)
            .field("success_outcome", &self.success_outcome)
            .field("error_outcome", &self.error_outcome)
            .finish()
    }
}

impl ToolNode {
    /// Build a node for `method`, failing fast when the tool's contract
    /// does not declare it.
    pub fn new(tool: Arc<dyn Tool>, method: impl Into<String>) -> Result<Self, CollabError> {
        let method = method.into();
        let contract = tool.contract();
        if !contract.declares(&method) {
            return Err(CollabError::undeclared_method(
                contract.name.clone(),
                method,
            ));
        }

        let name = format!("{}_{}", contract.name, method);
        Ok(Self {
            name,
            tool,
            method,
            arg_mapping: HashMap::new(),
            result_key: "tool_result".to_string(),
            error_handling: ErrorHandling::default(),
            success_outcome: NEXT.to_string(),
            error_outcome: ERROR.to_string(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Map a method parameter to the shared-state key it is read from
    pub fn map_arg(mut self, param: impl Into<String>, state_key: impl Into<String>) -> Self {
        self.arg_mapping.insert(param.into(), state_key.into());
        self
    }

    pub fn with_result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = key.into();
        self
    }

    pub fn with_error_handling(mut self, policy: ErrorHandling) -> Self {
        self.error_handling = policy;
        self
    }

    /// Override the outcome labels returned on success and on a recorded
    /// backend failure (defaults: `"next"` / `"error"`)
    pub fn with_outcomes(
        mut self,
        success: impl Into<Outcome>,
        error: impl Into<Outcome>,
    ) -> Self {
        self.success_outcome = success.into();
        self.error_outcome = error.into();
        self
    }
}

#[async_trait]
impl AsyncNode for ToolNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        let mut args = Map::new();
        let mut missing = Vec::new();

        for (param, state_key) in &self.arg_mapping {
            match shared.get(state_key) {
                Some(value) => {
                    args.insert(param.clone(), value.clone());
                }
                None => missing.push(state_key.clone()),
            }
        }
        if !missing.is_empty() {
            log::warn!(
                "node '{}': missing keys in shared state: {:?}",
                self.name,
                missing
            );
        }

        Ok(json!({ "args": args }))
    }

    async fn exec(&self, input: Value) -> Result<Value, StageError> {
        let args = input["args"].as_object().cloned().unwrap_or_default();

        match self.tool.invoke(&self.method, args).await {
            Ok(output) => Ok(json!({
                "result": output.result,
                "metadata": output.metadata,
                "success": true,
                "error": Value::Null,
            })),
            Err(err) => {
                log::error!(
                    "node '{}': tool method '{}' failed: {}",
                    self.name,
                    self.method,
                    err
                );
                if self.error_handling == ErrorHandling::Raise {
                    return Err(err.into());
                }
                Ok(json!({
                    "result": Value::Null,
                    "metadata": {},
                    "success": false,
                    "error": err.to_string(),
                }))
            }
        }
    }

    async fn post(
        &self,
        shared: &mut SharedState,
        _prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        shared.set(self.result_key.clone(), exec["result"].clone());
        shared.set(
            format!("{}_metadata", self.result_key),
            exec["metadata"].clone(),
        );
        shared.set(
            format!("{}_success", self.result_key),
            exec["success"].clone(),
        );

        if exec["error"].is_null() {
            Ok(self.success_outcome.clone())
        } else {
            shared.set(format!("{}_error", self.result_key), exec["error"].clone());
            Ok(self.error_outcome.clone())
        }
    }
}
