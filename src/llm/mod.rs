pub mod chatgpt;
pub mod llama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model backend error: {0}")]
    Backend(String),
    #[error("model returned no choices")]
    EmptyResponse,
    #[error("model call timed out after {0} seconds")]
    Timeout(u64),
}

/// Sampling parameters for a single generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A text generation engine, local or remote.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Raw completion of a fully formatted prompt.
    async fn complete(&self, prompt: &str, params: &SamplingParams)
        -> Result<String, GenerationError>;

    /// Chat completion. When `schema` is given the backend must constrain
    /// (or at least instruct) the output to match that JSON schema.
    async fn chat(
        &self,
        messages: &[ChatTurn],
        params: &SamplingParams,
        schema: Option<&Value>,
    ) -> Result<String, GenerationError>;
}
