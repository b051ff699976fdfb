//! Vector index abstraction and its backends.
//!
//! A session always queries an *alias*. Each ingestion run writes into a
//! fresh physical collection and then re-points the alias in one step, so
//! readers never observe a half-written collection.

pub mod qdrant;
mod schema;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Cosine,
    Dot,
}

impl Distance {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cosine" => Some(Self::Cosine),
            "dot" => Some(Self::Dot),
            _ => None,
        }
    }

    /// Similarity of two vectors under this metric. Higher is closer.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            Self::Dot => dot,
            Self::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
        }
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape every vector in a collection must have, and the model that
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub dimension: usize,
    pub distance: Distance,
    /// Empty when the collection predates model tracking.
    pub embedding_model: String,
}

impl CollectionSchema {
    /// Fail if an `existing` collection called `name` cannot hold vectors
    /// described by `self`. An untracked model is accepted.
    pub(crate) fn check_compatible(
        &self,
        name: &str,
        existing: &Self,
    ) -> Result<(), IndexError> {
        if existing.dimension != self.dimension || existing.distance != self.distance {
            return Err(IndexError::SchemaMismatch {
                collection: name.to_string(),
                expected_dimension: self.dimension,
                expected_distance: self.distance,
                actual_dimension: existing.dimension,
                actual_distance: existing.distance,
            });
        }
        if !existing.embedding_model.is_empty() && existing.embedding_model != self.embedding_model
        {
            return Err(IndexError::ModelMismatch {
                collection: name.to_string(),
                expected: self.embedding_model.clone(),
                actual: existing.embedding_model.clone(),
            });
        }
        Ok(())
    }
}

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub document_id: String,
    pub page: usize,
    pub offset: usize,
    pub overlap: usize,
    /// Position of the chunk within its document. Breaks score ties.
    pub seq: u64,
    pub embedding_model: String,
    pub text: String,
}

/// One upsert unit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    /// UUID string; stable for a given document and chunk sequence.
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create `name` with `schema` if absent, or verify an existing one.
    async fn ensure_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), IndexError>;

    /// Schema of `name` (collection or alias), `None` if it does not exist.
    async fn collection_schema(&self, name: &str) -> Result<Option<CollectionSchema>, IndexError>;

    /// Insert or replace records by id. A failed call applies nothing.
    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), IndexError>;

    /// Number of records in `name` (collection or alias).
    async fn count(&self, name: &str) -> Result<usize, IndexError>;

    /// Up to `k` records by descending score, ties by insertion order.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError>;

    /// Point `alias` at `collection`, returning the collection it pointed at before.
    async fn point_alias(&self, alias: &str, collection: &str)
    -> Result<Option<String>, IndexError>;

    /// Collection currently behind `alias`.
    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, IndexError>;

    /// Remove a collection, its records and any alias pointing at it.
    /// Missing collections are fine.
    async fn delete_collection(&self, name: &str) -> Result<(), IndexError>;

    /// Names of every physical collection.
    async fn list_collections(&self) -> Result<Vec<String>, IndexError>;

    /// Every alias with the collection it points at.
    async fn list_aliases(&self) -> Result<Vec<AliasBinding>, IndexError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasBinding {
    pub alias: String,
    pub collection: String,
}

/// Order hits by descending score, then ascending `seq`.
pub(crate) fn rank(records: &mut [ScoredRecord]) {
    records.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.payload.seq.cmp(&b.payload.seq))
    });
}
