// SPDX-License-Identifier: MIT

//! Async node variants
//!
//! Same lifecycle contract as the synchronous traits, with every stage a
//! suspension point. The intended use is I/O-bound work at collaborator
//! boundaries: a stage awaits the model/tool/agent call while unrelated
//! tasks in the process keep running. Within one async flow run, node
//! execution stays strictly sequential regardless of suspension.

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::node::{Outcome, NEXT};
use crate::engine::state::SharedState;
use crate::error::StageError;

/// Asynchronous unit of work with a three-stage lifecycle.
#[async_trait]
pub trait AsyncNode: Send + Sync {
    /// Display name, used in traces
    fn name(&self) -> &str;

    /// Prepare data from shared state for execution
    async fn prep(&self, _shared: &mut SharedState) -> Result<Value, StageError> {
        Ok(Value::Null)
    }

    /// Transform the prepared value
    async fn exec(&self, input: Value) -> Result<Value, StageError> {
        Ok(input)
    }

    /// Process results, update shared state, and pick the next outcome
    async fn post(
        &self,
        _shared: &mut SharedState,
        _prep: &Value,
        _exec: Value,
    ) -> Result<Outcome, StageError> {
        Ok(NEXT.to_string())
    }
}

/// Asynchronous batch variant; items are awaited in input order.
#[async_trait]
pub trait AsyncBatchNode: Send + Sync {
    /// Display name, used in traces
    fn name(&self) -> &str;

    /// Produce the items to process
    async fn prep(&self, _shared: &mut SharedState) -> Result<Vec<Value>, StageError> {
        Ok(Vec::new())
    }

    /// Transform one item
    async fn exec_item(&self, item: Value) -> Result<Value, StageError> {
        Ok(item)
    }

    /// Process the aggregated per-item results
    async fn post(
        &self,
        _shared: &mut SharedState,
        _items: &[Value],
        _results: Vec<Value>,
    ) -> Result<Outcome, StageError> {
        Ok(NEXT.to_string())
    }
}
