//! flowkit-rs: a graph-based execution engine for multi-step AI workflows.
//!
//! Processing units ([`Node`]s) are wired into a directed graph and driven
//! by a [`Flow`]: each node runs a prep/exec/post lifecycle against a shared
//! key-value blackboard ([`SharedState`]) and returns a string outcome label
//! that selects the next edge. Batch and async variants layer chunked and
//! I/O-bound work over the same contract, and the composites in
//! [`patterns`] add fan-out/fan-in, bounded iteration, embedded sub-flows,
//! and table-driven branching on top.
//!
//! ```
//! use flowkit_rs::{Flow, Node, NodeHandle, Outcome, SharedState, StageError, NEXT};
//! use serde_json::{json, Value};
//!
//! struct AddOne;
//!
//! impl Node for AddOne {
//!     fn name(&self) -> &str {
//!         "add_one"
//!     }
//!
//!     fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
//!         Ok(json!(shared.get_i64("current").unwrap_or(0)))
//!     }
//!
//!     fn exec(&self, input: Value) -> Result<Value, StageError> {
//!         Ok(json!(input.as_i64().unwrap_or(0) + 1))
//!     }
//!
//!     fn post(
//!         &self,
//!         shared: &mut SharedState,
//!         _prep: &Value,
//!         exec: Value,
//!     ) -> Result<Outcome, StageError> {
//!         shared.set("current", exec);
//!         Ok(NEXT.to_string())
//!     }
//! }
//!
//! let first = NodeHandle::new(AddOne);
//! let second = NodeHandle::new(AddOne);
//! first.then(&second);
//!
//! let result = Flow::new(first).run(&SharedState::new());
//! assert_eq!(result.get_i64("current"), Some(2));
//! ```

pub mod collab;
pub mod engine;
pub mod error;
pub mod nodes;
pub mod patterns;

pub use engine::async_flow::{AsyncBatchFlow, AsyncFlow};
pub use engine::async_node::{AsyncBatchNode, AsyncNode};
pub use engine::flow::{BatchFlow, Flow, OutcomePolicy, StepRecord, Stepper, DEFAULT_MAX_STEPS};
pub use engine::node::{BatchNode, Node, NodeHandle, Outcome, ERROR, NEXT};
pub use engine::observer::{CollectingObserver, FlowEvent, FlowObserver};
pub use engine::state::{ExecutionTrace, SharedState};
pub use error::{CollabError, ConfigError, StageError};
