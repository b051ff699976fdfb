//! The two core contracts, ingest a document and answer a question, bound
//! to one embedding engine, vector index and language model.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::document::Document;
use crate::embedding::EmbeddingEngine;
use crate::error::{AnswerError, ChunkError, IndexError, IngestError};
use crate::index::{Distance, VectorIndex};
use crate::llm::LanguageModel;
use crate::lock::CollectionLocks;
use crate::pipeline::answer::{Answer, AnswerOptions, answer_question};
use crate::pipeline::chunker::ChunkConfig;
use crate::pipeline::ingest::{
    CollectionHandle, IngestOptions, ORPHAN_GRACE, run_ingest, sweep_orphans,
};

/// Engine-wide knobs, usually derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub alias: String,
    pub chunk: ChunkConfig,
    pub distance: Distance,
    pub max_document_bytes: u64,
    pub top_k: usize,
    pub llm_timeout: Duration,
    pub ready_timeout: Duration,
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self, ChunkError> {
        Ok(Self {
            alias: settings.index.collection.clone(),
            chunk: ChunkConfig::new(settings.chunking.size, settings.chunking.overlap)?,
            distance: settings.index.distance,
            max_document_bytes: settings.max_document_bytes,
            top_k: settings.retrieval.top_k,
            llm_timeout: settings.llm.timeout(),
            ready_timeout: settings.retrieval.ready_timeout(),
        })
    }
}

pub struct Engine {
    embedder: EmbeddingEngine,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LanguageModel>,
    locks: CollectionLocks,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        embedder: EmbeddingEngine,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LanguageModel>,
        options: EngineOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            locks: CollectionLocks::new(),
            options,
        }
    }

    pub fn alias(&self) -> &str {
        &self.options.alias
    }

    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub const fn embedder(&self) -> &EmbeddingEngine {
        &self.embedder
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub async fn ingest(&self, document: &Document) -> Result<CollectionHandle, IngestError> {
        self.ingest_with_cancel(document, &CancellationToken::new())
            .await
    }

    pub async fn ingest_with_cancel(
        &self,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Result<CollectionHandle, IngestError> {
        self.ingest_into(&self.options.alias, document, cancel)
            .await
    }

    /// Ingest behind `alias` under its write lock. Questions on the same
    /// alias wait (up to the ready timeout) until this returns.
    pub async fn ingest_into(
        &self,
        alias: &str,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Result<CollectionHandle, IngestError> {
        let _guard = self.locks.write(alias).await;
        let options = IngestOptions {
            alias: alias.to_string(),
            chunk: self.options.chunk,
            distance: self.options.distance,
            max_document_bytes: self.options.max_document_bytes,
        };
        run_ingest(
            document,
            &options,
            &self.embedder,
            self.index.as_ref(),
            cancel,
        )
        .await
    }

    pub async fn answer(
        &self,
        handle: &CollectionHandle,
        question: &str,
    ) -> Result<Answer, AnswerError> {
        self.answer_with_top_k(handle, question, self.options.top_k)
            .await
    }

    pub async fn answer_with_top_k(
        &self,
        handle: &CollectionHandle,
        question: &str,
        top_k: usize,
    ) -> Result<Answer, AnswerError> {
        let _guard = self
            .locks
            .read(&handle.alias, self.options.ready_timeout)
            .await?;
        answer_question(
            handle,
            question,
            &self.embedder,
            self.index.as_ref(),
            self.llm.as_ref(),
            AnswerOptions {
                top_k,
                llm_timeout: self.options.llm_timeout,
            },
        )
        .await
    }

    /// Drop the collection behind `alias` together with the alias.
    pub async fn release(&self, alias: &str) -> Result<(), IndexError> {
        let _guard = self.locks.write(alias).await;
        if let Some(collection) = self.index.resolve_alias(alias).await? {
            self.index.delete_collection(&collection).await?;
            info!(alias = %alias, collection = %collection, "Released collection");
        }
        Ok(())
    }

    /// Remove staging collections of the engine alias, and of aliases
    /// derived from it, that were never published.
    pub async fn sweep_orphans(&self) -> Result<Vec<String>, IndexError> {
        sweep_orphans(self.index.as_ref(), &self.options.alias, ORPHAN_GRACE).await
    }

    /// Rebuild the handle of a collection published by an earlier run.
    ///
    /// The embedding model is read from the collection, falling back to a
    /// stored payload for collections that predate model tracking. A model
    /// other than the engine's is rejected.
    pub async fn attach(&self, alias: &str) -> Result<CollectionHandle, AnswerError> {
        let _guard = self
            .locks
            .read(alias, self.options.ready_timeout)
            .await?;

        let collection = self
            .index
            .resolve_alias(alias)
            .await?
            .ok_or_else(|| IndexError::CollectionNotFound(alias.to_string()))?;
        let schema = self
            .index
            .collection_schema(&collection)
            .await?
            .ok_or_else(|| IndexError::CollectionNotFound(collection.clone()))?;
        let chunk_count = self.index.count(&collection).await?;

        let mut unit_query = vec![0.0; schema.dimension];
        if let Some(first) = unit_query.first_mut() {
            *first = 1.0;
        }
        let sample = self.index.search(&collection, &unit_query, 1).await?;
        let (document_id, sampled_model) = sample.into_iter().next().map_or_else(
            || (String::new(), None),
            |hit| (hit.payload.document_id, Some(hit.payload.embedding_model)),
        );
        let embedding_model = if schema.embedding_model.is_empty() {
            sampled_model.unwrap_or_else(|| self.embedder.model_id().to_string())
        } else {
            schema.embedding_model
        };
        if embedding_model != self.embedder.model_id() {
            return Err(AnswerError::EmbeddingModelMismatch {
                indexed: embedding_model,
                configured: self.embedder.model_id().to_string(),
            });
        }

        debug!(alias = %alias, collection = %collection, chunk_count, "Attached to collection");
        Ok(CollectionHandle {
            alias: alias.to_string(),
            collection,
            document_id,
            embedding_model,
            dimension: schema.dimension,
            chunk_count,
        })
    }
}
