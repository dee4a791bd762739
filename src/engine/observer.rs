// SPDX-License-Identifier: MIT

//! Structured step-boundary events for flow observation
//!
//! An observer is handed to a flow at construction time and invoked at each
//! step boundary. There is no process-wide verbosity state: callers that
//! want tracing attach an observer, callers that don't pay nothing.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Events emitted while a flow runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum FlowEvent {
    /// A node is about to execute.
    StepStarted {
        flow: String,
        node: String,
        step: usize,
    },
    /// A node finished its lifecycle; `matched` says whether the outcome
    /// label resolved to an edge.
    StepFinished {
        flow: String,
        node: String,
        outcome: String,
        matched: bool,
    },
    /// A stage faulted; `recovered` says whether an `"error"` edge took over.
    StageFaulted {
        flow: String,
        node: String,
        message: String,
        recovered: bool,
    },
    /// Strict-mode notice: an outcome label had no matching edge.
    UnmatchedOutcome {
        flow: String,
        node: String,
        outcome: String,
    },
    /// The run ended.
    FlowFinished {
        flow: String,
        steps: usize,
        completed: bool,
        max_steps_reached: bool,
    },
}

/// Step-boundary callback attached to a flow at construction.
pub trait FlowObserver: Send + Sync {
    fn on_event(&self, event: &FlowEvent);
}

/// Observer that records every event, for inspection after a run.
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<FlowEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<FlowEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl FlowObserver for CollectingObserver {
    fn on_event(&self, event: &FlowEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
