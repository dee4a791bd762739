// SPDX-License-Identifier: MIT

//! Fan-out/fan-in composites
//!
//! Each branch runs an independent sub-flow against its own copy of shared
//! state, so branches share no mutable memory and need no locks. Joining
//! every branch is the single synchronization point: post never runs before
//! all branches have completed or faulted. Results are keyed by branch name,
//! so completion order cannot affect a commutative aggregation.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crate::engine::async_flow::AsyncFlow;
use crate::engine::async_node::AsyncNode;
use crate::engine::flow::Flow;
use crate::engine::node::{Node, Outcome, NEXT};
use crate::engine::state::SharedState;
use crate::error::StageError;

/// Merges the per-branch final states into a single value.
pub type Aggregator = Box<dyn Fn(&BTreeMap<String, SharedState>) -> Value + Send + Sync>;

const DEFAULT_OUTPUT_KEY: &str = "parallel_results";

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "branch panicked".to_string()
    }
}

/// Build the per-branch seed states: either a full copy of the current
/// shared state or a minimal `{"input": value}` projection.
fn branch_seeds<'a>(
    branch_names: impl Iterator<Item = &'a String>,
    shared: &SharedState,
    input_key: Option<&str>,
) -> Value {
    let projected = input_key.and_then(|key| shared.get(key)).cloned();
    let mut seeds = Map::new();
    for name in branch_names {
        let seed = match &projected {
            Some(value) => json!({ "input": value }),
            None => shared.to_json(),
        };
        seeds.insert(name.clone(), seed);
    }
    Value::Object(seeds)
}

fn store_results(
    shared: &mut SharedState,
    output_key: &str,
    aggregator: Option<&Aggregator>,
    results: Value,
) {
    match aggregator {
        Some(aggregate) => {
            let states: BTreeMap<String, SharedState> = results
                .as_object()
                .map(|map| {
                    map.iter()
                        .map(|(name, state)| (name.clone(), SharedState::from_json(state)))
                        .collect()
                })
                .unwrap_or_default();
            shared.set(output_key.to_string(), aggregate(&states));
        }
        None => shared.set(output_key.to_string(), results),
    }
}

/// Fan-out over synchronous sub-flows, one OS thread per branch.
///
/// A panicking branch is captured as an `{"error": message}` entry; a branch
/// whose run aborts on a stage fault carries its `error`/`error_node` keys
/// in its final state. Either way the siblings keep running and the result
/// mapping has exactly one entry per configured branch.
pub struct ParallelNode {
    name: String,
    branches: BTreeMap<String, Arc<Flow>>,
    aggregator: Option<Aggregator>,
    input_key: Option<String>,
    output_key: String,
}

impl ParallelNode {
    pub fn new() -> Self {
        Self {
            name: "parallel".to_string(),
            branches: BTreeMap::new(),
            aggregator: None,
            input_key: None,
            output_key: DEFAULT_OUTPUT_KEY.to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a named branch
    pub fn with_branch(mut self, name: impl Into<String>, flow: Flow) -> Self {
        self.branches.insert(name.into(), Arc::new(flow));
        self
    }

    pub fn with_aggregator(
        mut self,
        aggregator: impl Fn(&BTreeMap<String, SharedState>) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.aggregator = Some(Box::new(aggregator));
        self
    }

    /// Project only this key (as `"input"`) into each branch instead of the
    /// whole shared state
    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = Some(key.into());
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }
}

impl Default for ParallelNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for ParallelNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        Ok(branch_seeds(
            self.branches.keys(),
            shared,
            self.input_key.as_deref(),
        ))
    }

    fn exec(&self, input: Value) -> Result<Value, StageError> {
        let seeds: BTreeMap<String, SharedState> = input
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(name, seed)| (name.clone(), SharedState::from_json(seed)))
                    .collect()
            })
            .unwrap_or_default();

        let mut results = Map::new();
        thread::scope(|scope| {
            let mut handles = Vec::new();
            for (name, seed) in seeds {
                if let Some(flow) = self.branches.get(&name) {
                    let flow = flow.clone();
                    log::info!("parallel '{}': starting branch '{}'", self.name, name);
                    handles.push((name, scope.spawn(move || flow.run(&seed))));
                }
            }
            for (name, handle) in handles {
                match handle.join() {
                    Ok(state) => {
                        results.insert(name, state.to_json());
                    }
                    Err(payload) => {
                        let message = panic_message(payload);
                        log::error!(
                            "parallel '{}': branch '{}' panicked: {}",
                            self.name,
                            name,
                            message
                        );
                        results.insert(name, json!({ "error": message }));
                    }
                }
            }
        });

        Ok(Value::Object(results))
    }

    fn post(
        &self,
        shared: &mut SharedState,
        _prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        store_results(shared, &self.output_key, self.aggregator.as_ref(), exec);
        Ok(NEXT.to_string())
    }
}

/// Fan-out over async sub-flows via spawned tasks, joined before post.
pub struct AsyncParallelNode {
    name: String,
    branches: BTreeMap<String, Arc<AsyncFlow>>,
    aggregator: Option<Aggregator>,
    input_key: Option<String>,
    output_key: String,
}

impl AsyncParallelNode {
    pub fn new() -> Self {
        Self {
            name: "async_parallel".to_string(),
            branches: BTreeMap::new(),
            aggregator: None,
            input_key: None,
            output_key: DEFAULT_OUTPUT_KEY.to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a named branch
    pub fn with_branch(mut self, name: impl Into<String>, flow: AsyncFlow) -> Self {
        self.branches.insert(name.into(), Arc::new(flow));
        self
    }

    pub fn with_aggregator(
        mut self,
        aggregator: impl Fn(&BTreeMap<String, SharedState>) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.aggregator = Some(Box::new(aggregator));
        self
    }

    /// Project only this key (as `"input"`) into each branch instead of the
    /// whole shared state
    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = Some(key.into());
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }
}

impl Default for AsyncParallelNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsyncNode for AsyncParallelNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        Ok(branch_seeds(
            self.branches.keys(),
            shared,
            self.input_key.as_deref(),
        ))
    }

    async fn exec(&self, input: Value) -> Result<Value, StageError> {
        let mut names = Vec::new();
        let mut tasks = Vec::new();
        if let Some(seeds) = input.as_object() {
            for (name, seed) in seeds {
                if let Some(flow) = self.branches.get(name) {
                    let flow = flow.clone();
                    let seed = SharedState::from_json(seed);
                    log::info!("parallel '{}': starting branch '{}'", self.name, name);
                    names.push(name.clone());
                    tasks.push(tokio::spawn(async move { flow.run(&seed).await }));
                }
            }
        }

        let mut results = Map::new();
        for (name, joined) in names.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(state) => {
                    results.insert(name, state.to_json());
                }
                Err(err) => {
                    let message = err.to_string();
                    log::error!(
                        "parallel '{}': branch '{}' panicked: {}",
                        self.name,
                        name,
                        message
                    );
                    results.insert(name, json!({ "error": message }));
                }
            }
        }
        Ok(Value::Object(results))
    }

    async fn post(
        &self,
        shared: &mut SharedState,
        _prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        store_results(shared, &self.output_key, self.aggregator.as_ref(), exec);
        Ok(NEXT.to_string())
    }
}
