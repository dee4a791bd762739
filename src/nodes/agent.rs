// SPDX-License-Identifier: MIT

//! Agent-backed node

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::collab::Agent;
use crate::engine::async_node::AsyncNode;
use crate::engine::node::{Outcome, ERROR, NEXT};
use crate::engine::state::SharedState;
use crate::error::StageError;
use crate::nodes::ErrorHandling;

/// Shared-state key holding runtime configuration merged over the node's
/// static configuration before each agent call.
pub const KEY_AGENT_CONFIGURATION: &str = "agent_configuration";

/// Node that runs an agent backend over an input (and optional context)
/// taken from shared state.
pub struct AgentNode {
    name: String,
    agent: Arc<dyn Agent>,
    input_key: String,
    context_key: Option<String>,
    output_key: String,
    configuration: Map<String, Value>,
    error_handling: ErrorHandling,
    success_outcome: Outcome,
    error_outcome: Outcome,
}

impl AgentNode {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            name: "agent_node".to_string(),
            agent,
            input_key: "input".to_string(),
            context_key: None,
            output_key: "agent_output".to_string(),
            configuration: Map::new(),
            error_handling: ErrorHandling::default(),
            success_outcome: NEXT.to_string(),
            error_outcome: ERROR.to_string(),
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

    /// Read conversation context from this shared-state key (a list)
    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = Some(key.into());
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn with_configuration(mut self, configuration: Map<String, Value>) -> Self {
        self.configuration = configuration;
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
impl AsyncNode for AgentNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        let input = match shared.get(&self.input_key) {
            Some(value) => value.clone(),
            None => {
                log::warn!(
                    "node '{}': input key '{}' not found in shared state",
                    self.name,
                    self.input_key
                );
                Value::String(String::new())
            }
        };

        let context = self
            .context_key
            .as_ref()
            .and_then(|key| shared.get(key))
            .cloned()
            .unwrap_or(Value::Null);

        // Runtime configuration from shared state wins over the node's own.
        let mut configuration = self.configuration.clone();
        if let Some(runtime) = shared
            .get(KEY_AGENT_CONFIGURATION)
            .and_then(Value::as_object)
        {
            for (key, value) in runtime {
                configuration.insert(key.clone(), value.clone());
            }
        }

        Ok(json!({
            "input": input,
            "context": context,
            "configuration": configuration,
        }))
    }

    async fn exec(&self, input: Value) -> Result<Value, StageError> {
        let agent_input = input["input"].clone();
        let context = input["context"].as_array().cloned();
        let configuration = input["configuration"].as_object().cloned().unwrap_or_default();

        match self
            .agent
            .process(agent_input, context.as_deref(), &configuration)
            .await
        {
            Ok(reply) => Ok(json!({
                "response": reply.response,
                "metadata": reply.metadata,
                "success": true,
                "error": Value::Null,
            })),
            Err(err) => {
                log::error!("node '{}': agent call failed: {}", self.name, err);
                if self.error_handling == ErrorHandling::Raise {
                    return Err(err.into());
                }
                Ok(json!({
                    "response": Value::Null,
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
        shared.set(self.output_key.clone(), exec["response"].clone());
        shared.set(
            format!("{}_metadata", self.output_key),
            exec["metadata"].clone(),
        );
        shared.set(
            format!("{}_success", self.output_key),
            exec["success"].clone(),
        );

        if exec["error"].is_null() {
            Ok(self.success_outcome.clone())
        } else {
            shared.set(format!("{}_error", self.output_key), exec["error"].clone());
            Ok(self.error_outcome.clone())
        }
    }
}
