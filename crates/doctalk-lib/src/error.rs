//! Error taxonomy for the ingestion and answering pipelines.
//!
//! Component errors (`ExtractError`, `EmbeddingError`, `IndexError`,
//! `GenerationError`) are wrapped by the two aggregates, `IngestError` and
//! `AnswerError`, so callers always learn which stage failed.

use std::time::Duration;

use thiserror::Error;

use crate::index::Distance;

/// The uploaded bytes could not be turned into page text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The byte stream is not a PDF the extractor can parse.
    #[error("unreadable PDF: {reason}")]
    UnreadablePdf { reason: String },
    /// The upload exceeds the configured size ceiling.
    #[error("document is {size} bytes, above the {limit} byte limit")]
    DocumentTooLarge { size: u64, limit: u64 },
    /// The document file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The upload could not be written to its temporary file.
    #[error("failed to spool document to disk: {0}")]
    Spool(#[source] std::io::Error),
}

/// Chunking was asked to run with an impossible window.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunk configuration: size {size}, overlap {overlap}")]
    InvalidConfig { size: usize, overlap: usize },
}

/// The embedding model could not produce vectors.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Model loading or inference failed.
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),
    /// Inference did not finish within the configured timeout.
    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),
    /// The backend returned vectors of the wrong width.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// The backend returned a different number of vectors than inputs.
    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

/// The vector index rejected or could not serve a request.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The backing store cannot be reached.
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
    /// An existing collection was created with a different schema.
    #[error(
        "collection '{collection}' schema mismatch: expected {expected_dimension}/{expected_distance}, found {actual_dimension}/{actual_distance}"
    )]
    SchemaMismatch {
        collection: String,
        expected_dimension: usize,
        expected_distance: Distance,
        actual_dimension: usize,
        actual_distance: Distance,
    },
    /// An existing collection holds vectors from another embedding model.
    #[error("collection '{collection}' was embedded with '{actual}', expected '{expected}'")]
    ModelMismatch {
        collection: String,
        expected: String,
        actual: String,
    },
    /// The name resolves to no collection or alias.
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),
    /// The store answered with an error or a payload we cannot decode.
    #[error("vector index error: {0}")]
    Backend(String),
}

/// The language model could not produce a completion.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("language model unavailable: {0}")]
    Unavailable(String),
    #[error("language model timed out after {0:?}")]
    Timeout(Duration),
    /// The endpoint answered but refused the request.
    #[error("language model rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Stage of the ingestion pipeline, used in logs and user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Extract,
    Chunk,
    Embed,
    Index,
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Extract => "extract",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
            Self::Index => "index",
        })
    }
}

/// Ingestion of a document failed; no partial collection is visible.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ingestion failed during extract: {0}")]
    Extract(#[from] ExtractError),
    #[error("ingestion failed during chunk: {0}")]
    Chunk(#[from] ChunkError),
    #[error("ingestion failed during embed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("ingestion failed during index: {0}")]
    Index(#[from] IndexError),
    #[error("ingestion cancelled")]
    Cancelled,
}

impl IngestError {
    /// The stage that failed, or `None` for cancellation.
    pub const fn stage(&self) -> Option<IngestStage> {
        match self {
            Self::Extract(_) => Some(IngestStage::Extract),
            Self::Chunk(_) => Some(IngestStage::Chunk),
            Self::Embedding(_) => Some(IngestStage::Embed),
            Self::Index(_) => Some(IngestStage::Index),
            Self::Cancelled => None,
        }
    }

    /// Short message fit for an end user. Internal detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Extract(ExtractError::DocumentTooLarge { limit, .. }) => format!(
                "The file exceeds the {} MB limit. Please upload a smaller file.",
                limit / (1024 * 1024)
            ),
            Self::Extract(ExtractError::UnreadablePdf { .. }) => {
                "The file could not be read as a PDF.".to_string()
            }
            Self::Extract(ExtractError::Read { .. }) => "The file could not be read.".to_string(),
            Self::Extract(ExtractError::Spool(_)) => {
                "The file could not be stored for processing.".to_string()
            }
            Self::Chunk(_) => "The document could not be split into passages.".to_string(),
            Self::Embedding(_) => "The embedding model is unavailable right now.".to_string(),
            Self::Index(_) => "The document index is unavailable right now.".to_string(),
            Self::Cancelled => "Processing was cancelled.".to_string(),
        }
    }
}

/// Answering a question failed. The session records an apology instead.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("answer generation failed while embedding the question: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("answer generation failed while searching the index: {0}")]
    Index(#[from] IndexError),
    #[error("answer generation failed while calling the language model: {0}")]
    Generation(#[from] GenerationError),
    /// The collection was built with a different embedding model.
    #[error("collection was embedded with '{indexed}' but the engine uses '{configured}'")]
    EmbeddingModelMismatch { indexed: String, configured: String },
    /// An ingestion on the same collection is still running.
    #[error("collection '{0}' is not ready: ingestion still in progress")]
    NotReady(String),
}

impl AnswerError {
    /// Short message fit for an end user. Internal detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Embedding(_) => "the embedding model is unavailable",
            Self::Index(_) => "the document index is unavailable",
            Self::Generation(GenerationError::Timeout(_)) => "the language model took too long",
            Self::Generation(_) => "the language model is unavailable",
            Self::EmbeddingModelMismatch { .. } => {
                "the document was indexed with a different embedding model; please upload it again"
            }
            Self::NotReady(_) => "the document is still being processed",
        }
        .to_string()
    }
}
