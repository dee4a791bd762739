use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CollabError;

/// One method a tool declares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    pub description: String,
}

/// A tool's declared surface: its name and the methods it answers to.
///
/// Nodes validate their configured method against the contract before the
/// tool is ever invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContract {
    pub name: String,
    pub methods: Vec<MethodSpec>,
}

impl ToolContract {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Declare a method
    pub fn with_method(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.methods.push(MethodSpec {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    /// Whether `method` is declared
    pub fn declares(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.name == method)
    }
}

/// Result of a tool invocation: the value plus backend metadata.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub result: Value,
    pub metadata: Map<String, Value>,
}

impl ToolOutput {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            metadata: Map::new(),
        }
    }
}

/// A tool backend: named methods invoked with keyword arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The declared surface of this tool
    fn contract(&self) -> &ToolContract;

    /// Invoke a declared method
    async fn invoke(
        &self,
        method: &str,
        args: Map<String, Value>,
    ) -> Result<ToolOutput, CollabError>;
}
