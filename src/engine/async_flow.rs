// SPDX-License-Identifier: MIT

//! Async flow: the step loop with awaited lifecycle stages
//!
//! Same contract as the synchronous flow, but each stage of an async node is
//! awaited, suspending at collaborator boundaries without blocking other
//! tasks in the process. Node execution within one run remains strictly
//! sequential; suspension never interleaves two nodes of the same run.

use serde_json::Value;
use std::sync::Arc;

use crate::engine::flow::{
    Flow, OutcomePolicy, RunCursor, StepRecord, KEY_BATCH_INDEX, KEY_BATCH_ITEMS,
    KEY_TOTAL_BATCHES,
};
use crate::engine::node::NodeHandle;
use crate::engine::observer::FlowObserver;
use crate::engine::state::SharedState;
use crate::error::ConfigError;

/// A directed graph of nodes plus the awaiting step loop.
///
/// Synchronous nodes are legal inside an async flow; their stages simply run
/// inline between suspension points.
pub struct AsyncFlow {
    base: Flow,
}

impl AsyncFlow {
    /// Create an async flow starting at `start`
    pub fn new(start: NodeHandle) -> Self {
        Self {
            base: Flow::new(start),
        }
    }

    /// Set a display name for tracing
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.base = self.base.with_name(name);
        self
    }

    /// Set the step ceiling. Zero means "never execute anything".
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.base = self.base.with_max_steps(max_steps);
        self
    }

    /// Set the unmatched-outcome policy
    pub fn with_outcome_policy(mut self, policy: OutcomePolicy) -> Self {
        self.base = self.base.with_outcome_policy(policy);
        self
    }

    /// Attach a step-boundary observer
    pub fn with_observer(mut self, observer: Arc<dyn FlowObserver>) -> Self {
        self.base = self.base.with_observer(observer);
        self
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn start(&self) -> &NodeHandle {
        self.base.start()
    }

    /// Every node reachable from the start when the flow was built
    pub fn nodes(&self) -> &[NodeHandle] {
        self.base.nodes()
    }

    /// Run the flow to termination against a copy of `shared`.
    ///
    /// Same contract as [`Flow::run`], with every async stage awaited.
    pub async fn run(&self, shared: &SharedState) -> SharedState {
        let mut cursor = RunCursor::new(shared.clone(), self.base.start().clone());
        while self.advance(&mut cursor).await.is_some() {}
        self.base.finish(cursor)
    }

    async fn advance(&self, cursor: &mut RunCursor) -> Option<StepRecord> {
        let node = self.base.begin_step(cursor)?;
        let result = node.run_async(&mut cursor.state).await;
        Some(self.base.settle_step(cursor, &node, result))
    }
}

/// An async flow plus the chunked-run convenience.
pub struct AsyncBatchFlow {
    flow: AsyncFlow,
}

impl AsyncBatchFlow {
    pub fn new(flow: AsyncFlow) -> Self {
        Self { flow }
    }

    pub fn flow(&self) -> &AsyncFlow {
        &self.flow
    }

    /// Run the wrapped flow once
    pub async fn run(&self, shared: &SharedState) -> SharedState {
        self.flow.run(shared).await
    }

    /// Chunked runs with the same sequential per-chunk contract as
    /// [`crate::engine::flow::BatchFlow::run_chunked`]; each chunk's run is
    /// awaited to completion before the next begins.
    pub async fn run_chunked(
        &self,
        shared: &SharedState,
        items: &[Value],
        chunk_size: usize,
    ) -> Result<Vec<SharedState>, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        let total = items.len().div_ceil(chunk_size);
        let mut results = Vec::with_capacity(total);
        for (index, chunk) in items.chunks(chunk_size).enumerate() {
            log::info!(
                "flow '{}': processing chunk {}/{} ({} items)",
                self.flow.name(),
                index + 1,
                total,
                chunk.len()
            );
            let mut chunk_state = shared.clone();
            chunk_state.set(KEY_BATCH_ITEMS, Value::Array(chunk.to_vec()));
            chunk_state.set(KEY_BATCH_INDEX, index as u64);
            chunk_state.set(KEY_TOTAL_BATCHES, total as u64);
            results.push(self.flow.run(&chunk_state).await);
        }
        Ok(results)
    }
}
