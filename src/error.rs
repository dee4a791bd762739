// SPDX-License-Identifier: MIT

//! Typed error handling for flowkit-rs
//!
//! Faults raised inside node lifecycle stages are `StageError`s; faults from
//! model/tool/agent backends are `CollabError`s. Invalid composite
//! configuration is rejected at construction time with a `ConfigError`.

use thiserror::Error;

/// A fault raised inside a node's prep/exec/post stage.
///
/// Stage faults never escape a flow's `run`: the loop captures them into
/// reserved shared-state keys and either routes to the node's `"error"` edge
/// or halts with the partial state preserved.
#[derive(Debug, Error)]
pub enum StageError {
    /// Generic stage failure with a message
    #[error("{0}")]
    Message(String),

    /// A required key was absent from shared state
    #[error("missing key '{0}' in shared state")]
    MissingKey(String),

    /// A key held something other than the expected list
    #[error("expected a list under key '{0}' in shared state")]
    NotAList(String),

    /// An async node was scheduled by a synchronous flow
    #[error("async node '{0}' cannot run in a synchronous flow")]
    AsyncInSyncFlow(String),

    /// A collaborator backend fault surfaced by a stage configured to re-raise
    #[error("collaborator fault: {0}")]
    Collab(#[from] CollabError),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StageError {
    /// Create a generic stage fault
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl From<&str> for StageError {
    fn from(s: &str) -> Self {
        Self::Message(s.to_string())
    }
}

impl From<String> for StageError {
    fn from(s: String) -> Self {
        Self::Message(s)
    }
}

/// A fault from a model, tool, or agent backend.
#[derive(Debug, Error)]
pub enum CollabError {
    /// Model backend failure
    #[error("model backend error: {0}")]
    Model(String),

    /// Tool backend failure
    #[error("tool backend error: {0}")]
    Tool(String),

    /// Agent backend failure
    #[error("agent backend error: {0}")]
    Agent(String),

    /// A method name that the tool's contract does not declare
    #[error("method '{method}' is not declared by tool '{tool}'")]
    UndeclaredMethod { tool: String, method: String },
}

impl CollabError {
    /// Create a model backend error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    /// Create a tool backend error
    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool(message.into())
    }

    /// Create an agent backend error
    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent(message.into())
    }

    /// Create an undeclared-method error
    pub fn undeclared_method(tool: impl Into<String>, method: impl Into<String>) -> Self {
        Self::UndeclaredMethod {
            tool: tool.into(),
            method: method.into(),
        }
    }
}

/// Invalid composite configuration, rejected before anything runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Sequential composite built from an empty node list
    #[error("sequential composite requires at least one node")]
    EmptySequence,

    /// Chunked run requested with a chunk size of zero
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    /// Decision composite built with no options to choose from
    #[error("decision composite requires at least one option")]
    EmptyOptions,

    /// Contract validation failed at node construction
    #[error(transparent)]
    Collab(#[from] CollabError),
}
