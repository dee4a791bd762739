// SPDX-License-Identifier: MIT

//! Composite pattern nodes built from the engine primitives

pub mod coordinator;
pub mod decision;
pub mod loop_node;
pub mod map_reduce;
pub mod parallel;
pub mod sequential;

pub use coordinator::{CoordinatorNode, SpecialistNode, BACK_TO_COORDINATOR, COMPLETE};
pub use decision::{DecisionFn, DecisionNode, ModelDecisionNode};
pub use loop_node::{LoopNode, StopPredicate};
pub use map_reduce::{MapFn, MapNode, ReduceFn, ReduceNode};
pub use parallel::{Aggregator, AsyncParallelNode, ParallelNode};
pub use sequential::SequentialNode;
