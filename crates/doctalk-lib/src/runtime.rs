use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, warn};

use crate::config::{
    EmbeddingBackend, EmbeddingSettings, IndexBackend, IndexSettings, LlmSettings, Settings,
};
use crate::embedding::embedder::FastembedEmbedder;
use crate::embedding::hashing::HashingEmbedder;
use crate::embedding::{Embedder, EmbeddingEngine};
use crate::engine::{Engine, EngineOptions};
use crate::index::VectorIndex;
use crate::index::qdrant::QdrantIndex;
use crate::index::sqlite::SqliteIndex;
use crate::llm::LanguageModel;
use crate::llm::ollama::OllamaClient;

/// Everything a command needs: the effective settings and the engine built
/// from them.
pub struct Runtime {
    pub settings: Settings,
    pub engine: Arc<Engine>,
}

impl Runtime {
    /// Build every backend named in `settings`. Loading a fastembed model may
    /// download it on first use.
    ///
    /// Staging collections abandoned by earlier runs are swept here; a
    /// failed sweep is logged and does not stop startup.
    pub async fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        settings.validate()?;
        let embedder = build_embedder(&settings.embedding).await?;
        let index = build_index(&settings.index)?;
        let llm = build_llm(&settings.llm)?;
        let options = EngineOptions::from_settings(&settings)?;
        debug!(
            embedding_model = embedder.model_id(),
            index_backend = ?settings.index.backend,
            llm_model = llm.model_id(),
            "Runtime ready"
        );
        let engine = Arc::new(Engine::new(embedder, index, llm, options));
        if let Err(e) = engine.sweep_orphans().await {
            warn!(error = %e, alias = %engine.alias(), "Failed to sweep orphaned collections");
        }
        Ok(Self { settings, engine })
    }
}

pub async fn build_embedder(settings: &EmbeddingSettings) -> anyhow::Result<EmbeddingEngine> {
    let backend: Arc<dyn Embedder> = match settings.backend {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(settings.dimension)),
        EmbeddingBackend::Fastembed => {
            let model = settings.model.clone();
            let cache_dir = settings.cache_dir();
            let loaded =
                tokio::task::spawn_blocking(move || FastembedEmbedder::load(&model, &cache_dir))
                    .await
                    .context("Embedding model loader panicked")??;
            Arc::new(loaded)
        }
    };
    Ok(EmbeddingEngine::new(
        backend,
        settings.normalize,
        settings.batch_size,
        settings.timeout(),
    ))
}

pub fn build_index(settings: &IndexSettings) -> anyhow::Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match settings.backend {
        IndexBackend::Qdrant => Arc::new(QdrantIndex::new(
            &settings.url,
            settings.timeout(),
            settings.max_retries,
        )?),
        IndexBackend::Sqlite => Arc::new(SqliteIndex::open(&settings.sqlite_path)?),
    };
    Ok(index)
}

pub fn build_llm(settings: &LlmSettings) -> anyhow::Result<Arc<dyn LanguageModel>> {
    Ok(Arc::new(OllamaClient::new(
        &settings.url,
        &settings.model,
        settings.temperature,
        settings.seed,
        settings.timeout(),
    )?))
}
