use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::embedding::hashing::HashingEmbedder;
use crate::error::{EmbeddingError, GenerationError, IndexError};
use crate::index::{AliasBinding, CollectionSchema, IndexRecord, ScoredRecord, VectorIndex};
use crate::llm::{LanguageModel, Prompt};

/// Language model that answers with the user message it was given.
pub struct EchoModel;

#[async_trait]
impl LanguageModel for EchoModel {
    fn model_id(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        Ok(prompt.user.clone())
    }
}

/// Language model that always answers with the same text.
pub struct ScriptedModel {
    reply: String,
}

impl ScriptedModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        Ok(self.reply.clone())
    }
}

/// Language model that sleeps before answering.
pub struct SlowModel(pub Duration);

#[async_trait]
impl LanguageModel for SlowModel {
    fn model_id(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        tokio::time::sleep(self.0).await;
        Ok("late".to_string())
    }
}

/// Hashing embedder that sleeps before every batch.
pub struct SlowEmbedder {
    inner: HashingEmbedder,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(dimension: usize, delay: Duration) -> Self {
        Self {
            inner: HashingEmbedder::new(dimension),
            delay,
        }
    }
}

#[async_trait]
impl Embedder for SlowEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_batch(texts).await
    }
}

/// Vector index whose backing store is never reachable.
pub struct FailingIndex;

fn down() -> IndexError {
    IndexError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn ensure_collection(
        &self,
        _name: &str,
        _schema: &CollectionSchema,
    ) -> Result<(), IndexError> {
        Err(down())
    }

    async fn collection_schema(&self, _name: &str) -> Result<Option<CollectionSchema>, IndexError> {
        Err(down())
    }

    async fn upsert(&self, _collection: &str, _records: &[IndexRecord]) -> Result<(), IndexError> {
        Err(down())
    }

    async fn count(&self, _name: &str) -> Result<usize, IndexError> {
        Err(down())
    }

    async fn search(
        &self,
        _collection: &str,
        _query: &[f32],
        _k: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        Err(down())
    }

    async fn point_alias(
        &self,
        _alias: &str,
        _collection: &str,
    ) -> Result<Option<String>, IndexError> {
        Err(down())
    }

    async fn resolve_alias(&self, _alias: &str) -> Result<Option<String>, IndexError> {
        Err(down())
    }

    async fn delete_collection(&self, _name: &str) -> Result<(), IndexError> {
        Err(down())
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        Err(down())
    }

    async fn list_aliases(&self) -> Result<Vec<AliasBinding>, IndexError> {
        Err(down())
    }
}
