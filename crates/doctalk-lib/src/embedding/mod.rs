//! Text embedding: a backend trait plus the engine that batches, times out,
//! validates and normalizes backend output.

pub mod embedder;
pub mod hashing;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EmbeddingError;

/// A model that maps texts to fixed-width vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded in every index payload, e.g. `BAAI/bge-small-en-v1.5`.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Wraps an [`Embedder`] with batching, a per-batch timeout and output checks.
#[derive(Clone)]
pub struct EmbeddingEngine {
    backend: Arc<dyn Embedder>,
    normalize: bool,
    batch_size: usize,
    timeout: Duration,
}

impl EmbeddingEngine {
    pub fn new(
        backend: Arc<dyn Embedder>,
        normalize: bool,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            normalize,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed one batch of at most `batch_size` texts.
    ///
    /// The ingestion pipeline calls this per batch so it can observe
    /// cancellation between batches; [`Self::embed`] covers everything else.
    pub async fn embed_slice(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = tokio::time::timeout(self.timeout, self.backend.embed_batch(texts))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))??;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        let expected = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        if self.normalize {
            for vector in &mut vectors {
                normalize(vector);
            }
        }
        Ok(vectors)
    }

    /// Embed any number of texts, `batch_size` at a time.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_slice(batch).await?);
        }
        debug!(
            model = self.model_id(),
            count = texts.len(),
            "Embedded texts"
        );
        Ok(out)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_slice(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

/// Scale `vector` to unit Euclidean length. Zero vectors stay zero.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
