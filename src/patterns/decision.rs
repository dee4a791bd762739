// SPDX-License-Identifier: MIT

//! Table-driven branching nodes

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::collab::{GenerationParams, Model};
use crate::engine::async_node::AsyncNode;
use crate::engine::node::{Node, Outcome, NEXT};
use crate::engine::state::SharedState;
use crate::error::{ConfigError, StageError};
use crate::nodes::template;

/// Computes a condition key from shared state.
pub type DecisionFn = Box<dyn Fn(&SharedState) -> String + Send + Sync>;

/// Pure-function decision node: a caller-supplied function computes a
/// condition key, a table maps it to an outcome label, and a default label
/// covers everything else.
pub struct DecisionNode {
    name: String,
    decision_fn: DecisionFn,
    conditions: HashMap<String, Outcome>,
    default_outcome: Outcome,
}

impl DecisionNode {
    pub fn new(decision_fn: impl Fn(&SharedState) -> String + Send + Sync + 'static) -> Self {
        Self {
            name: "decision".to_string(),
            decision_fn: Box::new(decision_fn),
            conditions: HashMap::new(),
            default_outcome: "default".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Map a condition key to an outcome label
    pub fn with_condition(
        mut self,
        condition: impl Into<String>,
        outcome: impl Into<Outcome>,
    ) -> Self {
        self.conditions.insert(condition.into(), outcome.into());
        self
    }

    pub fn with_default(mut self, outcome: impl Into<Outcome>) -> Self {
        self.default_outcome = outcome.into();
        self
    }
}

impl Node for DecisionNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        Ok(Value::String((self.decision_fn)(shared)))
    }

    fn post(
        &self,
        _shared: &mut SharedState,
        _prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        let condition = exec.as_str().unwrap_or_default();
        let outcome = self
            .conditions
            .get(condition)
            .cloned()
            .unwrap_or_else(|| self.default_outcome.clone());
        log::info!(
            "decision node '{}' chose outcome '{}' for condition '{}'",
            self.name,
            outcome,
            condition
        );
        Ok(outcome)
    }
}

/// Model-backed decision node: formats a prompt listing a fixed option
/// list, asks the model, and matches the free-text response against the
/// options case-insensitively. An unrecognized response falls back to the
/// first option with a logged warning.
pub struct ModelDecisionNode {
    name: String,
    model: Arc<dyn Model>,
    prompt_template: String,
    options: Vec<String>,
    input_keys: Vec<String>,
    output_key: Option<String>,
    params: GenerationParams,
}

impl ModelDecisionNode {
    pub fn new(
        model: Arc<dyn Model>,
        prompt_template: impl Into<String>,
        options: Vec<String>,
    ) -> Result<Self, ConfigError> {
        if options.is_empty() {
            return Err(ConfigError::EmptyOptions);
        }
        Ok(Self {
            name: "model_decision".to_string(),
            model,
            prompt_template: prompt_template.into(),
            options,
            input_keys: Vec::new(),
            output_key: None,
            params: GenerationParams::new(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_input_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Also store the decision under this shared-state key
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl AsyncNode for ModelDecisionNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        let mut context = Map::new();
        for key in &self.input_keys {
            match shared.get(key) {
                Some(value) => {
                    context.insert(key.clone(), value.clone());
                }
                None => {
                    log::warn!(
                        "node '{}': input key '{}' not found in shared state",
                        self.name,
                        key
                    );
                    context.insert(key.clone(), Value::Null);
                }
            }
        }

        let options_text = self
            .options
            .iter()
            .map(|option| format!("- {}", option))
            .collect::<Vec<_>>()
            .join("\n");
        context.insert("options".to_string(), Value::String(options_text));

        let prompt = template::render(&self.prompt_template, &context)?;
        Ok(json!({ "prompt": prompt }))
    }

    async fn exec(&self, input: Value) -> Result<Value, StageError> {
        let prompt = input["prompt"].as_str().unwrap_or_default();
        let response = self.model.generate(prompt, &self.params).await?;

        let lowered = response.to_lowercase();
        for option in &self.options {
            if lowered.contains(&option.to_lowercase()) {
                return Ok(Value::String(option.clone()));
            }
        }

        let preview: String = response.chars().take(100).collect();
        log::warn!(
            "node '{}': response matched no option, falling back to '{}' (response: {})",
            self.name,
            self.options[0],
            preview
        );
        Ok(Value::String(self.options[0].clone()))
    }

    async fn post(
        &self,
        shared: &mut SharedState,
        _prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        if let Some(key) = &self.output_key {
            shared.set(key.clone(), exec.clone());
        }
        let choice = exec.as_str().unwrap_or(NEXT).to_string();
        log::info!("node '{}' chose outcome '{}'", self.name, choice);
        Ok(choice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::node::NodeHandle;
    use crate::error::CollabError;

    struct ScriptedModel {
        response: String,
    }

    impl ScriptedModel {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
            })
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, CollabError> {
            Ok(self.response.clone())
        }
    }

    #[test]
    fn test_decision_node_maps_condition_to_outcome() {
        let node = NodeHandle::new(
            DecisionNode::new(|shared| {
                if shared.get_i64("score").unwrap_or(0) >= 50 {
                    "high".to_string()
                } else {
                    "low".to_string()
                }
            })
            .with_condition("high", "approve")
            .with_condition("low", "reject"),
        );

        let mut state = SharedState::new();
        state.set("score", 80);
        assert_eq!(node.run(&mut state).unwrap(), "approve");

        state.set("score", 10);
        assert_eq!(node.run(&mut state).unwrap(), "reject");
    }

    #[test]
    fn test_decision_node_falls_back_to_default() {
        let node = NodeHandle::new(
            DecisionNode::new(|_| "unmapped".to_string())
                .with_condition("known", "go")
                .with_default("fallback"),
        );

        let mut state = SharedState::new();
        assert_eq!(node.run(&mut state).unwrap(), "fallback");
    }

    #[tokio::test]
    async fn test_model_decision_matches_case_insensitively() {
        let node = NodeHandle::new_async(
            ModelDecisionNode::new(
                ScriptedModel::new("I would pick SEARCH for this one."),
                "Pick one:\n{options}",
                vec!["search".to_string(), "code".to_string()],
            )
            .unwrap()
            .with_output_key("decision"),
        );

        let mut state = SharedState::new();
        let outcome = node.run_async(&mut state).await.unwrap();

        assert_eq!(outcome, "search");
        assert_eq!(state.get_str("decision"), Some("search"));
    }

    #[tokio::test]
    async fn test_model_decision_falls_back_to_first_option() {
        let node = NodeHandle::new_async(
            ModelDecisionNode::new(
                ScriptedModel::new("no idea"),
                "Pick one:\n{options}",
                vec!["summarize".to_string(), "translate".to_string()],
            )
            .unwrap(),
        );

        let mut state = SharedState::new();
        let outcome = node.run_async(&mut state).await.unwrap();
        assert_eq!(outcome, "summarize");
    }

    #[test]
    fn test_model_decision_rejects_empty_options() {
        let result = ModelDecisionNode::new(ScriptedModel::new(""), "{options}", Vec::new());
        assert!(matches!(result, Err(ConfigError::EmptyOptions)));
    }
}
