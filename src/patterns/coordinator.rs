// SPDX-License-Identifier: MIT

//! Coordinator / specialist composites
//!
//! A coordinator node plans which registered branch should handle the input
//! (planning pass), specialists record their outputs into a shared
//! per-branch mapping and route back, and the coordinator then synthesizes
//! a final response from the collected outputs (integration pass). The pass
//! is chosen by whether the outputs mapping holds anything yet.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::collab::{Agent, GenerationParams, Model};
use crate::engine::async_node::AsyncNode;
use crate::engine::node::{Outcome, NEXT};
use crate::engine::state::SharedState;
use crate::error::StageError;
use crate::nodes::template::{self, display_value};

/// Outcome a specialist returns to hand control back to the coordinator.
pub const BACK_TO_COORDINATOR: &str = "back_to_coordinator";
/// Outcome the coordinator returns once integration is done.
pub const COMPLETE: &str = "complete";

/// Model-backed coordinator over named specialist branches.
///
/// The planning template receives `{user_input}` and `{agent_options}`; the
/// integration template receives `{user_input}` and `{agent_outputs}`.
pub struct CoordinatorNode {
    name: String,
    model: Arc<dyn Model>,
    planning_template: String,
    integration_template: String,
    input_key: String,
    output_key: String,
    outputs_key: String,
    plan_key: String,
    branches: Vec<(Outcome, String)>,
    params: GenerationParams,
}

impl CoordinatorNode {
    pub fn new(
        model: Arc<dyn Model>,
        planning_template: impl Into<String>,
        integration_template: impl Into<String>,
    ) -> Self {
        Self {
            name: "coordinator".to_string(),
            model,
            planning_template: planning_template.into(),
            integration_template: integration_template.into(),
            input_key: "user_input".to_string(),
            output_key: "final_response".to_string(),
            outputs_key: "agent_outputs".to_string(),
            plan_key: "coordination_plan".to_string(),
            branches: Vec::new(),
            params: GenerationParams::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a branch: the outcome label that routes to it and the
    /// specialty text the planning response is matched against.
    pub fn with_branch(
        mut self,
        label: impl Into<Outcome>,
        specialty: impl Into<String>,
    ) -> Self {
        let label = label.into();
        let specialty = specialty.into();
        log::info!(
            "coordinator: registered specialty '{}' for outcome '{}'",
            specialty,
            label
        );
        self.branches.push((label, specialty));
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

    pub fn with_outputs_key(mut self, key: impl Into<String>) -> Self {
        self.outputs_key = key.into();
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl AsyncNode for CoordinatorNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        let input = shared
            .get(&self.input_key)
            .cloned()
            .ok_or_else(|| StageError::MissingKey(self.input_key.clone()))?;

        let outputs = shared
            .get(&self.outputs_key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut context = Map::new();
        context.insert("user_input".to_string(), input);

        if outputs.is_empty() {
            let options = self
                .branches
                .iter()
                .map(|(_, specialty)| format!("- {}", specialty))
                .collect::<Vec<_>>()
                .join("\n");
            context.insert("agent_options".to_string(), Value::String(options));

            let prompt = template::render(&self.planning_template, &context)?;
            Ok(json!({ "prompt": prompt, "phase": "planning" }))
        } else {
            let outputs_text = outputs
                .iter()
                .map(|(branch, output)| format!("=== {} ===\n{}", branch, display_value(output)))
                .collect::<Vec<_>>()
                .join("\n\n");
            context.insert("agent_outputs".to_string(), Value::String(outputs_text));

            let prompt = template::render(&self.integration_template, &context)?;
            Ok(json!({ "prompt": prompt, "phase": "integration" }))
        }
    }

    async fn exec(&self, input: Value) -> Result<Value, StageError> {
        let prompt = input["prompt"].as_str().unwrap_or_default();
        let response = self.model.generate(prompt, &self.params).await?;
        Ok(Value::String(response))
    }

    async fn post(
        &self,
        shared: &mut SharedState,
        prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        let response = exec.as_str().unwrap_or_default().to_string();

        if prep["phase"] == "planning" {
            shared.set(self.plan_key.clone(), response.clone());
            if !shared.contains(&self.outputs_key) {
                shared.set(self.outputs_key.clone(), json!({}));
            }

            let lowered = response.to_lowercase();
            for (label, specialty) in &self.branches {
                if lowered.contains(&specialty.to_lowercase()) {
                    log::info!(
                        "coordinator '{}': plan selected specialty '{}'",
                        self.name,
                        specialty
                    );
                    return Ok(label.clone());
                }
            }
            log::info!(
                "coordinator '{}': plan named no specialty, continuing with '{}'",
                self.name,
                NEXT
            );
            Ok(NEXT.to_string())
        } else {
            shared.set(self.output_key.clone(), response);
            Ok(COMPLETE.to_string())
        }
    }
}

/// Agent-backed specialist that records its output into the coordinator's
/// per-branch mapping and routes back.
pub struct SpecialistNode {
    name: String,
    agent: Arc<dyn Agent>,
    branch: String,
    role: String,
    input_key: String,
    outputs_key: String,
    return_outcome: Outcome,
    configuration: Map<String, Value>,
}

impl SpecialistNode {
    pub fn new(agent: Arc<dyn Agent>, branch: impl Into<String>, role: impl Into<String>) -> Self {
        let branch = branch.into();
        Self {
            name: format!("specialist_{}", branch),
            agent,
            branch,
            role: role.into(),
            input_key: "user_input".to_string(),
            outputs_key: "agent_outputs".to_string(),
            return_outcome: BACK_TO_COORDINATOR.to_string(),
            configuration: Map::new(),
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

    pub fn with_outputs_key(mut self, key: impl Into<String>) -> Self {
        self.outputs_key = key.into();
        self
    }

    pub fn with_return_outcome(mut self, outcome: impl Into<Outcome>) -> Self {
        self.return_outcome = outcome.into();
        self
    }

    pub fn with_configuration(mut self, configuration: Map<String, Value>) -> Self {
        self.configuration = configuration;
        self
    }
}

#[async_trait]
impl AsyncNode for SpecialistNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        let input = shared
            .get(&self.input_key)
            .ok_or_else(|| StageError::MissingKey(self.input_key.clone()))?;

        let wrapped = format!(
            "[ROLE: {} - {}]\n\nUSER QUERY: {}\n\nRespond with your specialist analysis based on your expertise.",
            self.branch,
            self.role,
            display_value(input)
        );
        Ok(json!({ "input": wrapped }))
    }

    async fn exec(&self, input: Value) -> Result<Value, StageError> {
        let reply = self
            .agent
            .process(input["input"].clone(), None, &self.configuration)
            .await?;
        Ok(reply.response)
    }

    async fn post(
        &self,
        shared: &mut SharedState,
        _prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        shared.set(format!("specialist_output_{}", self.branch), exec.clone());

        let mut outputs = shared
            .get(&self.outputs_key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        outputs.insert(self.branch.clone(), exec);
        shared.set(self.outputs_key.clone(), Value::Object(outputs));

        Ok(self.return_outcome.clone())
    }
}
