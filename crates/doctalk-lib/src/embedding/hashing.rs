use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::EmbeddingError;

pub const HASHING_MODEL_ID: &str = "doctalk/hashing-v1";

/// Deterministic bag-of-words feature hashing.
///
/// Each lowercased alphanumeric token is hashed with SHA-256; the digest
/// selects a bucket and a sign. No model files are needed, so this backend
/// serves offline runs and tests. Texts sharing words land close together,
/// which is enough for keyword-level retrieval.
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model_id: format!("{HASHING_MODEL_ID}-{dimension}"),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
