//! Language model seam used by the answering pipeline.

pub mod ollama;

use async_trait::async_trait;

use crate::error::GenerationError;

/// A chat prompt: one system instruction and one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// A single, non-streamed completion.
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}
