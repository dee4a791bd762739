use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::CollabError;

/// Result of an agent turn: the response plus backend metadata.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub response: Value,
    pub metadata: Map<String, Value>,
}

impl AgentReply {
    pub fn new(response: Value) -> Self {
        Self {
            response,
            metadata: Map::new(),
        }
    }
}

/// An agent backend: input and optional context in, response out.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn process(
        &self,
        input: Value,
        context: Option<&[Value]>,
        configuration: &Map<String, Value>,
    ) -> Result<AgentReply, CollabError>;
}
