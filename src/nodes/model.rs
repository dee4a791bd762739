// SPDX-License-Identifier: MIT

//! Model-backed node

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::collab::{GenerationParams, Model};
use crate::engine::async_node::AsyncNode;
use crate::engine::node::{Outcome, NEXT};
use crate::engine::state::SharedState;
use crate::error::StageError;
use crate::nodes::template;

/// Node that formats a prompt from shared state, runs the model backend,
/// and stores the generated text.
///
/// A backend fault does not fault the node: the output becomes an
/// `"Error: …"` string so downstream nodes can inspect it, matching the
/// degrade-don't-abort behavior expected of model calls in a longer flow.
pub struct ModelNode {
    name: String,
    model: Arc<dyn Model>,
    prompt_template: String,
    input_keys: Vec<String>,
    output_key: String,
    params: GenerationParams,
}

impl ModelNode {
    pub fn new(model: Arc<dyn Model>, prompt_template: impl Into<String>) -> Self {
        Self {
            name: "model_node".to_string(),
            model,
            prompt_template: prompt_template.into(),
            input_keys: Vec::new(),
            output_key: "model_output".to_string(),
            params: GenerationParams::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restrict the template context to these shared-state keys. With no
    /// input keys, the whole shared state is the context.
    pub fn with_input_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl AsyncNode for ModelNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        let mut context = Map::new();
        if self.input_keys.is_empty() {
            for (key, value) in shared.iter() {
                context.insert(key.clone(), value.clone());
            }
        } else {
            for key in &self.input_keys {
                match shared.get(key) {
                    Some(value) => {
                        context.insert(key.clone(), value.clone());
                    }
                    None => log::warn!(
                        "node '{}': input key '{}' not found in shared state",
                        self.name,
                        key
                    ),
                }
            }
        }

        let prompt = match template::render(&self.prompt_template, &context) {
            Ok(prompt) => prompt,
            Err(StageError::MissingKey(key)) => {
                log::error!("node '{}': missing template key '{}'", self.name, key);
                format!("Error: missing key '{}' in prompt template", key)
            }
            Err(err) => return Err(err),
        };

        Ok(json!({ "prompt": prompt, "context": context }))
    }

    async fn exec(&self, input: Value) -> Result<Value, StageError> {
        let prompt = input["prompt"].as_str().unwrap_or_default();

        match self.model.generate(prompt, &self.params).await {
            Ok(text) => Ok(Value::String(text)),
            Err(err) => {
                log::error!("node '{}': model call failed: {}", self.name, err);
                Ok(Value::String(format!("Error: {}", err)))
            }
        }
    }

    async fn post(
        &self,
        shared: &mut SharedState,
        prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        shared.set(self.output_key.clone(), exec);
        // Keep the rendered prompt around for inspection.
        shared.set(format!("{}_prompt", self.output_key), prep["prompt"].clone());
        Ok(NEXT.to_string())
    }
}
