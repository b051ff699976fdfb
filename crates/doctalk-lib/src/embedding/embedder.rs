use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::debug;

use super::Embedder;
use crate::error::EmbeddingError;

/// Local ONNX embedding model served by fastembed.
///
/// Inference is CPU-bound and needs `&mut` access to the session, so calls
/// run on the blocking pool behind a mutex.
pub struct FastembedEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_id: String,
    dimension: usize,
}

impl FastembedEmbedder {
    /// Load `model_code` (e.g. `BAAI/bge-small-en-v1.5`), downloading the
    /// model files into `cache_dir` on first use.
    ///
    /// Blocking: call from `spawn_blocking` inside async code.
    pub fn load(model_code: &str, cache_dir: &Path) -> Result<Self, EmbeddingError> {
        let (model, dimension) = resolve_model(model_code)?;
        let text_embedding = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| {
            EmbeddingError::Unavailable(format!("failed to load model {model_code}: {e}"))
        })?;
        debug!(model = model_code, dimension, cache_dir = %cache_dir.display(), "Loaded embedding model");
        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_id: model_code.to_string(),
            dimension,
        })
    }
}

/// Map a model code onto fastembed's built-in model list.
fn resolve_model(model_code: &str) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| info.model_code.eq_ignore_ascii_case(model_code))
        .map(|info| (info.model, info.dim))
        .ok_or_else(|| {
            EmbeddingError::Unavailable(format!("unsupported embedding model {model_code}"))
        })
}

#[async_trait]
impl Embedder for FastembedEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let owned = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| EmbeddingError::Unavailable("embedding model lock poisoned".into()))?;
            guard
                .embed(owned, None)
                .map_err(|e| EmbeddingError::Unavailable(format!("inference failed: {e}")))
        })
        .await
        .map_err(|e| EmbeddingError::Unavailable(format!("embedding task failed: {e}")))?
    }
}
