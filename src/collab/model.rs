// SPDX-License-Identifier: MIT

//! Generative-model capability trait

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::CollabError;

/// Open-ended generation parameters (temperature, token limits, and whatever
/// else a backend understands).
pub type GenerationParams = Map<String, Value>;

/// A generative-model backend: prompt in, text out.
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, CollabError>;
}
