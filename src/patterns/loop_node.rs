// SPDX-License-Identifier: MIT

//! Bounded iteration composite

use serde_json::{json, Value};

use crate::engine::flow::Flow;
use crate::engine::node::{Node, Outcome, NEXT};
use crate::engine::state::{SharedState, KEY_COMPLETED, KEY_ERROR, KEY_MAX_STEPS_REACHED};
use crate::error::StageError;

/// "Stop now" predicate, handed the running state and the completed
/// iteration count.
pub type StopPredicate = Box<dyn Fn(&SharedState, u32) -> bool + Send + Sync>;

/// Runs a sub-flow repeatedly against one running copy of shared state.
///
/// The iteration counter is written into the state before each run; the
/// loop stops when the predicate says stop, the iteration count reaches the
/// maximum, or a sub-run ends with an unrecovered fault (captured and
/// logged, never re-raised). On exit the running state merges back into the
/// caller's state and the per-iteration final states are recorded under the
/// result key.
pub struct LoopNode {
    name: String,
    flow: Flow,
    stop_when: StopPredicate,
    max_iterations: u32,
    iteration_key: String,
    result_key: String,
}

impl LoopNode {
    pub fn new(
        flow: Flow,
        stop_when: impl Fn(&SharedState, u32) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: "loop".to_string(),
            flow,
            stop_when: Box::new(stop_when),
            max_iterations: 10,
            iteration_key: "iteration".to_string(),
            result_key: "loop_results".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_iteration_key(mut self, key: impl Into<String>) -> Self {
        self.iteration_key = key.into();
        self
    }

    pub fn with_result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = key.into();
        self
    }

    /// A run that halted on a stage fault, as opposed to finishing or
    /// hitting its own step budget.
    fn run_aborted(state: &SharedState) -> bool {
        state.get_bool(KEY_COMPLETED) == Some(false)
            && state.get_bool(KEY_MAX_STEPS_REACHED) != Some(true)
            && state.contains(KEY_ERROR)
    }
}

impl Node for LoopNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
        Ok(shared.to_json())
    }

    fn exec(&self, input: Value) -> Result<Value, StageError> {
        let mut running = SharedState::from_json(&input);
        let mut history: Vec<Value> = Vec::new();
        let mut iteration: u32 = 0;

        while iteration < self.max_iterations {
            running.set(self.iteration_key.clone(), iteration);
            log::info!("loop '{}': iteration {}", self.name, iteration);

            let result = self.flow.run(&running);
            history.push(result.to_json());
            let aborted = Self::run_aborted(&result);
            running = result;
            iteration += 1;

            if aborted {
                log::error!(
                    "loop '{}': sub-flow aborted on iteration {}, stopping",
                    self.name,
                    iteration
                );
                break;
            }
            if (self.stop_when)(&running, iteration) {
                log::info!(
                    "loop '{}': stop condition satisfied after {} iterations",
                    self.name,
                    iteration
                );
                break;
            }
        }

        if iteration >= self.max_iterations {
            log::info!(
                "loop '{}': reached maximum iterations ({})",
                self.name,
                self.max_iterations
            );
        }

        Ok(json!({
            "state": running.to_json(),
            "results": history,
            "iterations": iteration,
        }))
    }

    fn post(
        &self,
        shared: &mut SharedState,
        _prep: &Value,
        exec: Value,
    ) -> Result<Outcome, StageError> {
        shared.merge_from(&SharedState::from_json(&exec["state"]));
        shared.set(self.result_key.clone(), exec["results"].clone());
        shared.set(
            format!("{}_count", self.iteration_key),
            exec["iterations"].clone(),
        );
        Ok(NEXT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::node::NodeHandle;

    struct Increment {
        name: String,
    }

    impl Node for Increment {
        fn name(&self) -> &str {
            &self.name
        }

        fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
            let counter = shared.get_i64("counter").unwrap_or(0);
            shared.set("counter", counter + 1);
            Ok(Value::Null)
        }
    }

    struct FailOnThird {
        name: String,
    }

    impl Node for FailOnThird {
        fn name(&self) -> &str {
            &self.name
        }

        fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
            let counter = shared.get_i64("counter").unwrap_or(0) + 1;
            shared.set("counter", counter);
            if counter >= 3 {
                return Err(StageError::message("third time fails"));
            }
            Ok(Value::Null)
        }
    }

    fn increment_flow() -> Flow {
        Flow::new(NodeHandle::new(Increment {
            name: "increment".to_string(),
        }))
    }

    #[test]
    fn test_loop_runs_to_max_iterations() {
        let node = NodeHandle::new(
            LoopNode::new(increment_flow(), |_, _| false).with_max_iterations(3),
        );

        let mut state = SharedState::new();
        node.run(&mut state).unwrap();

        assert_eq!(state.get_i64("counter"), Some(3));
        assert_eq!(state.get_i64("iteration_count"), Some(3));
        assert_eq!(state.get_array("loop_results").map(Vec::len), Some(3));
    }

    #[test]
    fn test_loop_stops_when_predicate_says_so() {
        let node = NodeHandle::new(
            LoopNode::new(increment_flow(), |state, _| {
                state.get_i64("counter").unwrap_or(0) >= 2
            })
            .with_max_iterations(10),
        );

        let mut state = SharedState::new();
        node.run(&mut state).unwrap();

        assert_eq!(state.get_i64("counter"), Some(2));
        assert_eq!(state.get_i64("iteration_count"), Some(2));
    }

    #[test]
    fn test_loop_sees_iteration_counter_before_each_run() {
        struct RecordIteration {
            name: String,
        }

        impl Node for RecordIteration {
            fn name(&self) -> &str {
                &self.name
            }

            fn prep(&self, shared: &mut SharedState) -> Result<Value, StageError> {
                let seen = shared.get_i64("iteration").unwrap_or(-1);
                let mut log = shared.get_array("seen").cloned().unwrap_or_default();
                log.push(json!(seen));
                shared.set("seen", Value::Array(log));
                Ok(Value::Null)
            }
        }

        let flow = Flow::new(NodeHandle::new(RecordIteration {
            name: "record".to_string(),
        }));
        let node = NodeHandle::new(LoopNode::new(flow, |_, _| false).with_max_iterations(3));

        let mut state = SharedState::new();
        node.run(&mut state).unwrap();

        assert_eq!(state.get("seen"), Some(&json!([0, 1, 2])));
    }

    #[test]
    fn test_loop_aborts_on_unrecovered_sub_flow_fault() {
        let flow = Flow::new(NodeHandle::new(FailOnThird {
            name: "fail_on_third".to_string(),
        }));
        let node = NodeHandle::new(LoopNode::new(flow, |_, _| false).with_max_iterations(10));

        let mut state = SharedState::new();
        let outcome = node.run(&mut state).unwrap();

        // The fault is captured, not re-raised.
        assert_eq!(outcome, NEXT);
        assert_eq!(state.get_i64("iteration_count"), Some(3));
        assert_eq!(state.get_str(KEY_ERROR), Some("third time fails"));
    }
}
