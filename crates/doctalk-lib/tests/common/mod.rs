use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use doctalk_lib::config::Settings;
use doctalk_lib::embedding::EmbeddingEngine;
use doctalk_lib::embedding::hashing::HashingEmbedder;
use doctalk_lib::engine::{Engine, EngineOptions};
use doctalk_lib::error::{GenerationError, IndexError};
use doctalk_lib::index::sqlite::SqliteIndex;
use doctalk_lib::index::{AliasBinding, CollectionSchema, IndexRecord, ScoredRecord, VectorIndex};
use doctalk_lib::llm::{LanguageModel, Prompt};
use doctalk_lib::pipeline::prompt::EMPTY_CONTEXT;

pub const NOT_IN_DOCUMENT: &str = "The document does not contain this information.";

/// Answers with the text of the best-ranked context passage, or with
/// [`NOT_IN_DOCUMENT`] when the context is empty.
pub struct ExtractiveModel;

#[async_trait]
impl LanguageModel for ExtractiveModel {
    fn model_id(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        if prompt.user.contains(EMPTY_CONTEXT) {
            return Ok(NOT_IN_DOCUMENT.to_string());
        }
        let passage = prompt
            .user
            .lines()
            .find_map(|line| line.strip_prefix("[1] "))
            .and_then(|rest| rest.split_once(") "))
            .map(|(_, text)| text.to_string())
            .unwrap_or_default();
        Ok(passage)
    }
}

/// SQLite index that can be switched off mid-test.
pub struct SwitchableIndex {
    inner: SqliteIndex,
    down: AtomicBool,
}

impl SwitchableIndex {
    pub fn new() -> Self {
        Self {
            inner: SqliteIndex::in_memory().unwrap(),
            down: AtomicBool::new(false),
        }
    }

    pub fn take_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), IndexError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SwitchableIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), IndexError> {
        self.check()?;
        self.inner.ensure_collection(name, schema).await
    }

    async fn collection_schema(&self, name: &str) -> Result<Option<CollectionSchema>, IndexError> {
        self.check()?;
        self.inner.collection_schema(name).await
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), IndexError> {
        self.check()?;
        self.inner.upsert(collection, records).await
    }

    async fn count(&self, name: &str) -> Result<usize, IndexError> {
        self.check()?;
        self.inner.count(name).await
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        self.check()?;
        self.inner.search(collection, query, k).await
    }

    async fn point_alias(
        &self,
        alias: &str,
        collection: &str,
    ) -> Result<Option<String>, IndexError> {
        self.check()?;
        self.inner.point_alias(alias, collection).await
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, IndexError> {
        self.check()?;
        self.inner.resolve_alias(alias).await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        self.check()?;
        self.inner.delete_collection(name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        self.check()?;
        self.inner.list_collections().await
    }

    async fn list_aliases(&self) -> Result<Vec<AliasBinding>, IndexError> {
        self.check()?;
        self.inner.list_aliases().await
    }
}

/// Settings for small fixtures: short chunks so a page yields several.
pub fn small_chunk_options() -> EngineOptions {
    let mut settings = Settings::default();
    settings.chunking.size = 120;
    settings.chunking.overlap = 30;
    EngineOptions::from_settings(&settings).unwrap()
}

pub fn hashing_engine() -> EmbeddingEngine {
    EmbeddingEngine::new(
        Arc::new(HashingEmbedder::new(384)),
        true,
        16,
        Duration::from_secs(5),
    )
}

pub fn engine_with_index(index: Arc<dyn VectorIndex>) -> Engine {
    Engine::new(
        hashing_engine(),
        index,
        Arc::new(ExtractiveModel),
        small_chunk_options(),
    )
}

pub fn sqlite_engine() -> Engine {
    engine_with_index(Arc::new(SqliteIndex::in_memory().unwrap()))
}
