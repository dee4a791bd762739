// SPDX-License-Identifier: MIT

//! Node lifecycle contract and graph wiring
//!
//! A node is the unit of work: prep reads shared state, exec transforms the
//! prepared value, post writes results back and returns the outcome label
//! that selects the next edge. Edges are owned by the source node's handle
//! and wired with an explicit `connect` call; assigning the same label twice
//! overwrites the earlier edge.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::engine::async_node::{AsyncBatchNode, AsyncNode};
use crate::engine::state::SharedState;
use crate::error::StageError;

/// Outcome label returned by a node's post stage.
pub type Outcome = String;

/// Default continuation label.
pub const NEXT: &str = "next";
/// Fault-handler label followed when a stage faults.
pub const ERROR: &str = "error";

/// Synchronous unit of work with a three-stage lifecycle.
///
/// Every stage has a default: prep yields null, exec is the identity, post
/// returns `"next"`. The only ordering guarantee is prep before exec before
/// post within one invocation. exec receives only the prepared value, which
/// keeps it a pure transform by construction.
pub trait Node: Send + Sync {
    /// Display name, used in traces; not required to be unique
    fn name(&self) -> &str;

    /// Prepare data from shared state for execution
    fn prep(&self, _shared: &mut SharedState) -> Result<Value, StageError> {
        Ok(Value::Null)
    }

    /// Transform the prepared value
    fn exec(&self, input: Value) -> Result<Value, StageError> {
        Ok(input)
    }

    /// Process results, update shared state, and pick the next outcome
    fn post(
        &self,
        _shared: &mut SharedState,
        _prep: &Value,
        _exec: Value,
    ) -> Result<Outcome, StageError> {
        Ok(NEXT.to_string())
    }
}

/// Node variant that applies its per-item transform across a collection.
///
/// prep returns the finite ordered collection; the per-item transform runs
/// once per item in input order; post receives the aggregated results. An
/// empty collection still reaches post with an empty result list.
pub trait BatchNode: Send + Sync {
    /// Display name, used in traces
    fn name(&self) -> &str;

    /// Produce the items to process
    fn prep(&self, _shared: &mut SharedState) -> Result<Vec<Value>, StageError> {
        Ok(Vec::new())
    }

    /// Transform one item
    fn exec_item(&self, item: Value) -> Result<Value, StageError> {
        Ok(item)
    }

    /// Process the aggregated per-item results
    fn post(
        &self,
        _shared: &mut SharedState,
        _items: &[Value],
        _results: Vec<Value>,
    ) -> Result<Outcome, StageError> {
        Ok(NEXT.to_string())
    }
}

pub(crate) enum NodeKind {
    Sync(Arc<dyn Node>),
    Batch(Arc<dyn BatchNode>),
    Async(Arc<dyn AsyncNode>),
    AsyncBatch(Arc<dyn AsyncBatchNode>),
}

struct NodeInner {
    kind: NodeKind,
    edges: RwLock<HashMap<String, NodeHandle>>,
}

/// Shareable handle to a node plus its outgoing edges.
///
/// Identity is the underlying allocation, not the display name: two handles
/// compare equal iff they point at the same node. Cloning a handle never
/// clones the node.
#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<NodeInner>,
}

impl NodeHandle {
    fn from_kind(kind: NodeKind) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                kind,
                edges: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Wrap a synchronous node
    pub fn new(node: impl Node + 'static) -> Self {
        Self::from_kind(NodeKind::Sync(Arc::new(node)))
    }

    /// Wrap a batch node
    pub fn batch(node: impl BatchNode + 'static) -> Self {
        Self::from_kind(NodeKind::Batch(Arc::new(node)))
    }

    /// Wrap an async node
    pub fn new_async(node: impl AsyncNode + 'static) -> Self {
        Self::from_kind(NodeKind::Async(Arc::new(node)))
    }

    /// Wrap an async batch node
    pub fn async_batch(node: impl AsyncBatchNode + 'static) -> Self {
        Self::from_kind(NodeKind::AsyncBatch(Arc::new(node)))
    }

    /// Display name of the wrapped node
    pub fn name(&self) -> String {
        match &self.inner.kind {
            NodeKind::Sync(n) => n.name().to_string(),
            NodeKind::Batch(n) => n.name().to_string(),
            NodeKind::Async(n) => n.name().to_string(),
            NodeKind::AsyncBatch(n) => n.name().to_string(),
        }
    }

    /// Wire an edge from this node to `target` under `label`.
    ///
    /// At most one target per label: wiring the same label twice replaces
    /// the earlier target. Returns `&self` so several labels can be wired
    /// off the same node in one expression.
    pub fn connect(&self, label: impl Into<String>, target: &NodeHandle) -> &Self {
        self.inner
            .edges
            .write()
            .unwrap()
            .insert(label.into(), target.clone());
        self
    }

    /// Wire the default `"next"` edge and hand back the target, so linear
    /// chains read `a.then(&b).then(&c)`.
    pub fn then(&self, target: &NodeHandle) -> NodeHandle {
        self.connect(NEXT, target);
        target.clone()
    }

    /// Resolve the edge for an outcome label
    pub fn edge(&self, label: &str) -> Option<NodeHandle> {
        self.inner.edges.read().unwrap().get(label).cloned()
    }

    /// Snapshot of the outgoing edges
    pub fn edges(&self) -> Vec<(String, NodeHandle)> {
        self.inner
            .edges
            .read()
            .unwrap()
            .iter()
            .map(|(label, target)| (label.clone(), target.clone()))
            .collect()
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Run the full synchronous lifecycle against `state`, returning the
    /// outcome label. An async node is a stage fault here, not a panic.
    pub fn run(&self, state: &mut SharedState) -> Result<Outcome, StageError> {
        self.run_sync_stages(state).map(|(_, outcome)| outcome)
    }

    /// Synchronous lifecycle that also surfaces the exec result, which the
    /// sequential composite stores under its output key.
    pub(crate) fn run_sync_stages(
        &self,
        state: &mut SharedState,
    ) -> Result<(Value, Outcome), StageError> {
        match &self.inner.kind {
            NodeKind::Sync(node) => {
                let prep = node.prep(state)?;
                let exec = node.exec(prep.clone())?;
                let outcome = node.post(state, &prep, exec.clone())?;
                Ok((exec, outcome))
            }
            NodeKind::Batch(node) => {
                let items = node.prep(state)?;
                let mut results = Vec::with_capacity(items.len());
                for item in &items {
                    results.push(node.exec_item(item.clone())?);
                }
                let exec = Value::Array(results.clone());
                let outcome = node.post(state, &items, results)?;
                Ok((exec, outcome))
            }
            NodeKind::Async(node) => Err(StageError::AsyncInSyncFlow(node.name().to_string())),
            NodeKind::AsyncBatch(node) => {
                Err(StageError::AsyncInSyncFlow(node.name().to_string()))
            }
        }
    }

    /// Run the full lifecycle with async stages awaited. Synchronous nodes
    /// run inline between suspension points.
    pub async fn run_async(&self, state: &mut SharedState) -> Result<Outcome, StageError> {
        match &self.inner.kind {
            NodeKind::Sync(_) | NodeKind::Batch(_) => self.run(state),
            NodeKind::Async(node) => {
                let prep = node.prep(state).await?;
                let exec = node.exec(prep.clone()).await?;
                node.post(state, &prep, exec).await
            }
            NodeKind::AsyncBatch(node) => {
                let items = node.prep(state).await?;
                // Items are awaited strictly in input order; fan-out belongs
                // to the parallel composite, not to batch nodes.
                let mut results = Vec::with_capacity(items.len());
                for item in &items {
                    results.push(node.exec_item(item.clone()).await?);
                }
                node.post(state, &items, results).await
            }
        }
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.ptr_id().hash(hasher);
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("name", &self.name())
            .finish()
    }
}

/// Depth-first discovery of every node reachable from `start`.
///
/// Each node is visited once regardless of how many edges point at it, so
/// cyclic graphs terminate here and are only re-visited during execution.
pub(crate) fn collect_reachable(start: &NodeHandle) -> Vec<NodeHandle> {
    let mut nodes = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![start.clone()];

    while let Some(node) = stack.pop() {
        if !visited.insert(node.ptr_id()) {
            continue;
        }
        for (_, target) in node.edges() {
            stack.push(target);
        }
        nodes.push(node);
    }

    nodes
}
