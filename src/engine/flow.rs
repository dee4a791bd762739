// SPDX-License-Identifier: MIT

//! Flow: the step loop that drives a node graph
//!
//! A flow owns a start node, discovers the reachable node set, and runs the
//! loop: execute the current node's lifecycle, look the returned outcome up
//! in the node's edge map, transition. An outcome with no matching edge is
//! normal termination, not an error. Stage faults are captured into shared
//! state and routed to the node's `"error"` edge when one is wired;
//! otherwise the run halts with the partial state preserved. Cycles are
//! legal; the step ceiling is the only cycle-termination safety net.

use serde_json::Value;
use std::sync::Arc;

use crate::engine::node::{collect_reachable, NodeHandle, Outcome, ERROR};
use crate::engine::observer::{FlowEvent, FlowObserver};
use crate::engine::state::{ExecutionTrace, SharedState, KEY_ERROR, KEY_ERROR_NODE};
use crate::error::{ConfigError, StageError};

/// Default step ceiling for a run.
pub const DEFAULT_MAX_STEPS: usize = 100;

/// Key under which a chunked run stores the current chunk.
pub const KEY_BATCH_ITEMS: &str = "batch_items";
/// Key under which a chunked run stores the current chunk index.
pub const KEY_BATCH_INDEX: &str = "batch_index";
/// Key under which a chunked run stores the total chunk count.
pub const KEY_TOTAL_BATCHES: &str = "total_batches";

/// What to do when an outcome label resolves to no edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutcomePolicy {
    /// Terminate silently (the default)
    #[default]
    Permissive,
    /// Terminate, but log a warning and emit an observer event
    Strict,
}

/// One executed step: the node that ran and the outcome it returned.
/// `outcome` is `None` when the node faulted with no error handler.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub node: String,
    pub outcome: Option<Outcome>,
}

/// In-progress run bookkeeping shared by the sync and async loops.
pub(crate) struct RunCursor {
    pub state: SharedState,
    pub current: Option<NodeHandle>,
    pub trace: ExecutionTrace,
    pub aborted: bool,
}

impl RunCursor {
    pub(crate) fn new(state: SharedState, start: NodeHandle) -> Self {
        Self {
            state,
            current: Some(start),
            trace: ExecutionTrace::default(),
            aborted: false,
        }
    }
}

/// A directed graph of nodes plus the step loop that executes them.
pub struct Flow {
    start: NodeHandle,
    name: String,
    nodes: Vec<NodeHandle>,
    max_steps: usize,
    policy: OutcomePolicy,
    observer: Option<Arc<dyn FlowObserver>>,
}

impl Flow {
    /// Create a flow starting at `start`. The reachable node set is
    /// discovered here; wire edges before building the flow.
    pub fn new(start: NodeHandle) -> Self {
        let nodes = collect_reachable(&start);
        Self {
            start,
            name: "flow".to_string(),
            nodes,
            max_steps: DEFAULT_MAX_STEPS,
            policy: OutcomePolicy::default(),
            observer: None,
        }
    }

    /// Set a display name for tracing
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the step ceiling. Zero means "never execute anything".
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the unmatched-outcome policy
    pub fn with_outcome_policy(mut self, policy: OutcomePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach a step-boundary observer
    pub fn with_observer(mut self, observer: Arc<dyn FlowObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> &NodeHandle {
        &self.start
    }

    /// Every node reachable from the start when the flow was built
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub(crate) fn emit(&self, event: FlowEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }

    /// Run the flow to termination against a copy of `shared`.
    ///
    /// The caller's state is never mutated. The returned state carries the
    /// execution trace under the reserved keys; after an unrecovered stage
    /// fault it additionally carries `error` and `error_node`, with
    /// `_flow_completed` false.
    pub fn run(&self, shared: &SharedState) -> SharedState {
        let mut cursor = RunCursor::new(shared.clone(), self.start.clone());
        while self.advance(&mut cursor).is_some() {}
        self.finish(cursor)
    }

    /// Single-step execution: each `step()` call runs exactly one node.
    pub fn stepper(&self, shared: &SharedState) -> Stepper<'_> {
        Stepper {
            flow: self,
            cursor: RunCursor::new(shared.clone(), self.start.clone()),
        }
    }

    /// Execute one step, or return `None` when the run has terminated or
    /// the step budget is spent.
    fn advance(&self, cursor: &mut RunCursor) -> Option<StepRecord> {
        let node = self.begin_step(cursor)?;
        let result = node.run(&mut cursor.state);
        Some(self.settle_step(cursor, &node, result))
    }

    /// Budget check plus trace/observer bookkeeping for the next node.
    pub(crate) fn begin_step(&self, cursor: &mut RunCursor) -> Option<NodeHandle> {
        if cursor.trace.steps >= self.max_steps {
            return None;
        }
        let node = cursor.current.clone()?;

        cursor.trace.steps += 1;
        let name = node.name();
        cursor.trace.path.push(name.clone());
        log::info!(
            "flow '{}': executing node '{}' (step {})",
            self.name,
            name,
            cursor.trace.steps
        );
        self.emit(FlowEvent::StepStarted {
            flow: self.name.clone(),
            node: name,
            step: cursor.trace.steps,
        });
        Some(node)
    }

    /// Resolve the next node from a finished lifecycle, capturing faults
    /// into shared state and routing them to the `"error"` edge.
    pub(crate) fn settle_step(
        &self,
        cursor: &mut RunCursor,
        node: &NodeHandle,
        result: Result<Outcome, StageError>,
    ) -> StepRecord {
        let name = node.name();
        match result {
            Ok(outcome) => {
                let next = node.edge(&outcome);
                let matched = next.is_some();
                log::info!(
                    "flow '{}': node '{}' returned outcome '{}'",
                    self.name,
                    name,
                    outcome
                );
                self.emit(FlowEvent::StepFinished {
                    flow: self.name.clone(),
                    node: name.clone(),
                    outcome: outcome.clone(),
                    matched,
                });
                if !matched && self.policy == OutcomePolicy::Strict {
                    log::warn!(
                        "flow '{}': no edge for outcome '{}' from node '{}'",
                        self.name,
                        outcome,
                        name
                    );
                    self.emit(FlowEvent::UnmatchedOutcome {
                        flow: self.name.clone(),
                        node: name.clone(),
                        outcome: outcome.clone(),
                    });
                }
                cursor.current = next;
                StepRecord {
                    node: name,
                    outcome: Some(outcome),
                }
            }
            Err(err) => {
                let message = err.to_string();
                log::error!("flow '{}': error in node '{}': {}", self.name, name, message);
                cursor.state.set(KEY_ERROR, message.clone());
                cursor.state.set(KEY_ERROR_NODE, name.clone());

                let handler = node.edge(ERROR);
                let recovered = handler.is_some();
                self.emit(FlowEvent::StageFaulted {
                    flow: self.name.clone(),
                    node: name.clone(),
                    message,
                    recovered,
                });

                if !recovered {
                    log::error!(
                        "flow '{}': no error handler on node '{}', stopping",
                        self.name,
                        name
                    );
                    cursor.aborted = true;
                    cursor.current = None;
                    return StepRecord {
                        node: name,
                        outcome: None,
                    };
                }
                cursor.current = handler;
                StepRecord {
                    node: name,
                    outcome: Some(ERROR.to_string()),
                }
            }
        }
    }

    /// Write the trace into the state and emit the terminal event.
    pub(crate) fn finish(&self, mut cursor: RunCursor) -> SharedState {
        cursor.trace.completed = cursor.current.is_none() && !cursor.aborted;
        cursor.trace.max_steps_reached = cursor.trace.steps >= self.max_steps;
        cursor.trace.record(&mut cursor.state);

        log::info!(
            "flow '{}' finished in {} steps (completed: {})",
            self.name,
            cursor.trace.steps,
            cursor.trace.completed
        );
        self.emit(FlowEvent::FlowFinished {
            flow: self.name.clone(),
            steps: cursor.trace.steps,
            completed: cursor.trace.completed,
            max_steps_reached: cursor.trace.max_steps_reached,
        });
        cursor.state
    }
}

/// Step-by-step executor over one run, created by [`Flow::stepper`].
pub struct Stepper<'a> {
    flow: &'a Flow,
    cursor: RunCursor,
}

impl Stepper<'_> {
    /// Run exactly one node; `None` once the run has terminated.
    pub fn step(&mut self) -> Option<StepRecord> {
        self.flow.advance(&mut self.cursor)
    }

    /// The state as of the last executed step (trace keys not yet written)
    pub fn state(&self) -> &SharedState {
        &self.cursor.state
    }

    /// Finish the run without executing further nodes and return the state
    /// with the trace keys written.
    pub fn into_state(self) -> SharedState {
        self.flow.finish(self.cursor)
    }
}

/// A flow plus a convenience for running it once per fixed-size chunk of an
/// externally supplied collection.
pub struct BatchFlow {
    flow: Flow,
}

impl BatchFlow {
    pub fn new(flow: Flow) -> Self {
        Self { flow }
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Run the wrapped flow once
    pub fn run(&self, shared: &SharedState) -> SharedState {
        self.flow.run(shared)
    }

    /// Slice `items` into `ceil(N / chunk_size)` chunks (the last may be
    /// shorter) and run the whole flow once per chunk, sequentially. Each
    /// chunk runs on its own copy of `shared` carrying `batch_items`,
    /// `batch_index`, and `total_batches`; the per-chunk final states are
    /// returned in chunk order.
    pub fn run_chunked(
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
            results.push(self.flow.run(&chunk_state));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::node::{BatchNode, Node, NEXT};
    use crate::engine::observer::CollectingObserver;
    use crate::engine::state::{
        KEY_COMPLETED, KEY_EXECUTION_PATH, KEY_MAX_STEPS_REACHED, KEY_STEPS,
    };
    use crate::error::StageError;
    use serde_json::json;

    struct NumberNode {
        name: String,
        number: i64,
    }

    impl NumberNode {
        fn handle(name: &str, number: i64) -> NodeHandle {
            NodeHandle::new(Self {
                name: name.to_string(),
                number,
            })
        }
    }

    impl Node for NumberNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
            shared.set("current", self.number);
            Ok(json!(self.number))
        }
    }

    struct AddNode {
        name: String,
        number: i64,
    }

    impl AddNode {
        fn handle(name: &str, number: i64) -> NodeHandle {
            NodeHandle::new(Self {
                name: name.to_string(),
                number,
            })
        }
    }

    impl Node for AddNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
            Ok(json!(shared.get_i64("current").unwrap_or(0)))
        }

        fn exec(&self, input: Value) -> Result<Value, StageError> {
            Ok(json!(input.as_i64().unwrap_or(0) + self.number))
        }

        fn post(
            &self,
            shared: &mut SharedState,
            _prep: &Value,
            exec: Value,
        ) -> Result<Outcome, StageError> {
            shared.set("current", exec);
            Ok(NEXT.to_string())
        }
    }

    struct MultiplyNode {
        name: String,
        number: i64,
    }

    impl MultiplyNode {
        fn handle(name: &str, number: i64) -> NodeHandle {
            NodeHandle::new(Self {
                name: name.to_string(),
                number,
            })
        }
    }

    impl Node for MultiplyNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
            Ok(json!(shared.get_i64("current").unwrap_or(1)))
        }

        fn exec(&self, input: Value) -> Result<Value, StageError> {
            Ok(json!(input.as_i64().unwrap_or(1) * self.number))
        }

        fn post(
            &self,
            shared: &mut SharedState,
            _prep: &Value,
            exec: Value,
        ) -> Result<Outcome, StageError> {
            shared.set("current", exec);
            Ok(NEXT.to_string())
        }
    }

    struct CheckPositiveNode {
        name: String,
    }

    impl CheckPositiveNode {
        fn handle(name: &str) -> NodeHandle {
            NodeHandle::new(Self {
                name: name.to_string(),
            })
        }
    }

    impl Node for CheckPositiveNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
            Ok(json!(shared.get_i64("current").unwrap_or(0)))
        }

        fn post(
            &self,
            _shared: &mut SharedState,
            _prep: &Value,
            exec: Value,
        ) -> Result<Outcome, StageError> {
            if exec.as_i64().unwrap_or(0) >= 0 {
                Ok("positive".to_string())
            } else {
                Ok("negative".to_string())
            }
        }
    }

    struct EndSignalNode {
        name: String,
        signal: String,
    }

    impl EndSignalNode {
        fn handle(name: &str, signal: &str) -> NodeHandle {
            NodeHandle::new(Self {
                name: name.to_string(),
                signal: signal.to_string(),
            })
        }
    }

    impl Node for EndSignalNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn post(
            &self,
            _shared: &mut SharedState,
            _prep: &Value,
            _exec: Value,
        ) -> Result<Outcome, StageError> {
            Ok(self.signal.clone())
        }
    }

    struct FailingNode {
        name: String,
    }

    impl Node for FailingNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn exec(&self, _input: Value) -> Result<Value, StageError> {
            Err(StageError::message("boom"))
        }
    }

    struct ChunkSumNode {
        name: String,
    }

    impl BatchNode for ChunkSumNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn prep(&self, shared: &mut SharedState) -> Result<Vec<Value>, StageError> {
            Ok(shared.get_array(KEY_BATCH_ITEMS).cloned().unwrap_or_default())
        }

        fn post(
            &self,
            shared: &mut SharedState,
            items: &[Value],
            _results: Vec<Value>,
        ) -> Result<Outcome, StageError> {
            let sum: i64 = items.iter().filter_map(Value::as_i64).sum();
            shared.set("chunk_sum", sum);
            Ok(NEXT.to_string())
        }
    }

    fn linear_flow() -> Flow {
        let start = NumberNode::handle("start", 5);
        let add = AddNode::handle("add", 10);
        let multiply = MultiplyNode::handle("multiply", 2);
        start.then(&add).then(&multiply);
        Flow::new(start).with_name("linear_flow")
    }

    #[test]
    fn test_linear_flow() {
        let result = linear_flow().run(&SharedState::new());

        assert_eq!(result.get_i64("current"), Some(30)); // (5 + 10) * 2
        assert_eq!(result.get_bool(KEY_COMPLETED), Some(true));
        assert_eq!(result.get_i64(KEY_STEPS), Some(3));
        assert_eq!(
            result.get(KEY_EXECUTION_PATH),
            Some(&json!(["start", "add", "multiply"]))
        );
        assert_eq!(result.get_bool(KEY_MAX_STEPS_REACHED), Some(false));
    }

    #[test]
    fn test_caller_state_is_never_mutated() {
        let mut shared = SharedState::new();
        shared.set("untouched", true);

        let flow = linear_flow();
        let _ = flow.run(&shared);

        assert_eq!(shared.len(), 1);
        assert!(!shared.contains("current"));
    }

    #[test]
    fn test_deterministic_runs_produce_identical_state() {
        let flow = linear_flow();
        let first = flow.run(&SharedState::new());
        let second = flow.run(&SharedState::new());
        assert_eq!(first, second);
    }

    fn branch_flow() -> Flow {
        let start = CheckPositiveNode::handle("check");
        let positive = AddNode::handle("positive_branch", 10);
        let negative = MultiplyNode::handle("negative_branch", -1);
        start.connect("positive", &positive);
        start.connect("negative", &negative);
        Flow::new(start).with_name("branch_flow")
    }

    #[test]
    fn test_branch_flow_positive() {
        let mut shared = SharedState::new();
        shared.set("current", 5);

        let result = branch_flow().run(&shared);
        assert_eq!(result.get_i64("current"), Some(15)); // 5 + 10
        assert_eq!(
            result.get(KEY_EXECUTION_PATH),
            Some(&json!(["check", "positive_branch"]))
        );
    }

    #[test]
    fn test_branch_flow_negative() {
        let mut shared = SharedState::new();
        shared.set("current", -5);

        let result = branch_flow().run(&shared);
        assert_eq!(result.get_i64("current"), Some(5)); // -5 * -1
        assert_eq!(
            result.get(KEY_EXECUTION_PATH),
            Some(&json!(["check", "negative_branch"]))
        );
    }

    #[test]
    fn test_cyclic_flow_terminates_on_sign_change() {
        let start = NumberNode::handle("start", 10);
        let check = CheckPositiveNode::handle("check");
        let subtract = AddNode::handle("subtract", -3);
        let end = EndSignalNode::handle("end", "cycle_complete");

        start.then(&check);
        check.connect("positive", &subtract);
        check.connect("negative", &end);
        subtract.then(&check); // cycle back

        let flow = Flow::new(start).with_name("cyclic_flow");
        let result = flow.run(&SharedState::new());

        // 10 -> 7 -> 4 -> 1 -> -2, then the negative edge ends the cycle
        assert_eq!(result.get_i64("current"), Some(-2));
        assert_eq!(result.get_bool(KEY_COMPLETED), Some(true));
        assert_eq!(result.get_bool(KEY_MAX_STEPS_REACHED), Some(false));
        let path = result.get_array(KEY_EXECUTION_PATH).unwrap();
        assert_eq!(path.last(), Some(&json!("end")));
    }

    #[test]
    fn test_unmatched_outcome_terminates_permissively() {
        let observer = Arc::new(CollectingObserver::new());
        let check = CheckPositiveNode::handle("check");
        check.connect("positive", &AddNode::handle("positive_branch", 10));
        // no edge for "negative"

        let mut shared = SharedState::new();
        shared.set("current", -5);

        let flow = Flow::new(check).with_observer(observer.clone());
        let result = flow.run(&shared);

        assert_eq!(result.get_bool(KEY_COMPLETED), Some(true));
        assert!(!observer
            .events()
            .iter()
            .any(|e| matches!(e, FlowEvent::UnmatchedOutcome { .. })));
    }

    #[test]
    fn test_unmatched_outcome_warns_in_strict_mode() {
        let observer = Arc::new(CollectingObserver::new());
        let check = CheckPositiveNode::handle("check");
        check.connect("positive", &AddNode::handle("positive_branch", 10));

        let mut shared = SharedState::new();
        shared.set("current", -5);

        let flow = Flow::new(check)
            .with_outcome_policy(OutcomePolicy::Strict)
            .with_observer(observer.clone());
        let result = flow.run(&shared);

        // Strict mode still terminates normally, it just surfaces the miss.
        assert_eq!(result.get_bool(KEY_COMPLETED), Some(true));
        assert!(observer.events().iter().any(|e| matches!(
            e,
            FlowEvent::UnmatchedOutcome { outcome, .. } if outcome == "negative"
        )));
    }

    #[test]
    fn test_stage_fault_routes_to_error_edge() {
        let failing = NodeHandle::new(FailingNode {
            name: "failing".to_string(),
        });
        let recovery = NumberNode::handle("recovery", 1);
        failing.connect(ERROR, &recovery);

        let flow = Flow::new(failing).with_name("recovering_flow");
        let result = flow.run(&SharedState::new());

        assert_eq!(result.get_str(KEY_ERROR), Some("boom"));
        assert_eq!(result.get_str(KEY_ERROR_NODE), Some("failing"));
        assert_eq!(result.get_bool(KEY_COMPLETED), Some(true));
        assert_eq!(
            result.get(KEY_EXECUTION_PATH),
            Some(&json!(["failing", "recovery"]))
        );
    }

    #[test]
    fn test_unrecovered_fault_halts_with_partial_state() {
        let start = NumberNode::handle("start", 5);
        let failing = NodeHandle::new(FailingNode {
            name: "failing".to_string(),
        });
        let unreached = NumberNode::handle("unreached", 99);
        start.then(&failing).then(&unreached);

        let flow = Flow::new(start);
        let result = flow.run(&SharedState::new());

        assert_eq!(result.get_bool(KEY_COMPLETED), Some(false));
        assert_eq!(result.get_str(KEY_ERROR), Some("boom"));
        assert_eq!(result.get_str(KEY_ERROR_NODE), Some("failing"));
        // The partial state from before the fault survives for inspection.
        assert_eq!(result.get_i64("current"), Some(5));
        assert_eq!(
            result.get(KEY_EXECUTION_PATH),
            Some(&json!(["start", "failing"]))
        );
    }

    #[test]
    fn test_zero_step_budget_executes_nothing() {
        let flow = linear_flow().with_max_steps(0);
        let result = flow.run(&SharedState::new());

        assert_eq!(result.get_i64(KEY_STEPS), Some(0));
        assert_eq!(result.get_bool(KEY_COMPLETED), Some(false));
        assert_eq!(result.get_bool(KEY_MAX_STEPS_REACHED), Some(true));
        assert!(!result.contains("current"));
    }

    #[test]
    fn test_step_budget_exhaustion_is_flagged_not_raised() {
        // A two-node cycle with no exit.
        let a = NumberNode::handle("a", 1);
        let b = NumberNode::handle("b", 2);
        a.then(&b).then(&a);

        let flow = Flow::new(a).with_max_steps(6);
        let result = flow.run(&SharedState::new());

        assert_eq!(result.get_i64(KEY_STEPS), Some(6));
        assert_eq!(result.get_bool(KEY_MAX_STEPS_REACHED), Some(true));
        assert_eq!(result.get_bool(KEY_COMPLETED), Some(false));
    }

    #[test]
    fn test_stepper_executes_one_node_per_call() {
        let flow = linear_flow();
        let mut stepper = flow.stepper(&SharedState::new());

        let first = stepper.step().unwrap();
        assert_eq!(first.node, "start");
        assert_eq!(stepper.state().get_i64("current"), Some(5));

        let second = stepper.step().unwrap();
        assert_eq!(second.node, "add");
        assert_eq!(stepper.state().get_i64("current"), Some(15));

        let third = stepper.step().unwrap();
        assert_eq!(third.node, "multiply");
        assert_eq!(stepper.state().get_i64("current"), Some(30));

        assert!(stepper.step().is_none());

        let state = stepper.into_state();
        assert_eq!(state.get_bool(KEY_COMPLETED), Some(true));
        assert_eq!(state.get_i64(KEY_STEPS), Some(3));
    }

    #[test]
    fn test_flow_discovers_reachable_nodes() {
        let flow = linear_flow();
        assert_eq!(flow.nodes().len(), 3);
    }

    #[test]
    fn test_chunked_run_sums_per_chunk() {
        let node = NodeHandle::batch(ChunkSumNode {
            name: "chunk_sum".to_string(),
        });
        let batch = BatchFlow::new(Flow::new(node).with_name("chunk_flow"));

        let items: Vec<Value> = (0..20).map(Value::from).collect();
        let results = batch
            .run_chunked(&SharedState::new(), &items, 7)
            .unwrap();

        assert_eq!(results.len(), 3); // ceil(20 / 7)
        let sums: Vec<i64> = results
            .iter()
            .map(|s| s.get_i64("chunk_sum").unwrap())
            .collect();
        assert_eq!(sums, vec![21, 84, 105]);

        // Chunk bookkeeping is visible to the flow under the batch keys.
        assert_eq!(results[0].get_i64(KEY_BATCH_INDEX), Some(0));
        assert_eq!(results[2].get_i64(KEY_TOTAL_BATCHES), Some(3));
        assert_eq!(
            results[2].get_array(KEY_BATCH_ITEMS).map(|c| c.len()),
            Some(6)
        );
    }

    #[test]
    fn test_chunked_run_empty_input() {
        let node = NodeHandle::batch(ChunkSumNode {
            name: "chunk_sum".to_string(),
        });
        let batch = BatchFlow::new(Flow::new(node));

        let results = batch.run_chunked(&SharedState::new(), &[], 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_chunked_run_rejects_zero_chunk_size() {
        let node = NodeHandle::batch(ChunkSumNode {
            name: "chunk_sum".to_string(),
        });
        let batch = BatchFlow::new(Flow::new(node));

        let err = batch
            .run_chunked(&SharedState::new(), &[json!(1)], 0)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroChunkSize));
    }
}
