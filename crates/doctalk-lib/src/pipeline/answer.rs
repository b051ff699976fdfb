use std::time::Duration;

use tracing::{debug, warn};

use crate::embedding::EmbeddingEngine;
use crate::error::{AnswerError, GenerationError};
use crate::index::{ScoredRecord, VectorIndex};
use crate::llm::LanguageModel;
use crate::pipeline::ingest::CollectionHandle;
use crate::pipeline::prompt::build_prompt;

#[derive(Debug, Clone, Copy)]
pub struct AnswerOptions {
    pub top_k: usize,
    pub llm_timeout: Duration,
}

/// A grounded answer and the passages it was conditioned on.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Completion text, verbatim.
    pub text: String,
    pub sources: Vec<ScoredRecord>,
}

/// Embed `question`, retrieve the top passages behind `handle.alias` and ask
/// the language model for one completion.
///
/// Only passages of `handle.document_id` are used; anything else found
/// behind the alias is dropped.
///
/// An empty retrieval still reaches the model, with an explicitly empty
/// context, so it can say the document does not cover the question.
pub async fn answer_question(
    handle: &CollectionHandle,
    question: &str,
    embedder: &EmbeddingEngine,
    index: &dyn VectorIndex,
    llm: &dyn LanguageModel,
    options: AnswerOptions,
) -> Result<Answer, AnswerError> {
    if handle.embedding_model != embedder.model_id() || handle.dimension != embedder.dimension() {
        return Err(AnswerError::EmbeddingModelMismatch {
            indexed: handle.embedding_model.clone(),
            configured: embedder.model_id().to_string(),
        });
    }

    let query = embedder.embed_query(question).await?;
    let mut sources = index.search(&handle.alias, &query, options.top_k).await?;
    let retrieved = sources.len();
    sources.retain(|s| s.payload.document_id == handle.document_id);
    if sources.len() < retrieved {
        warn!(
            alias = %handle.alias,
            document_id = %handle.document_id,
            dropped = retrieved - sources.len(),
            "Dropped passages of another document"
        );
    }
    if let Some(stale) = sources
        .iter()
        .find(|s| s.payload.embedding_model != embedder.model_id())
    {
        return Err(AnswerError::EmbeddingModelMismatch {
            indexed: stale.payload.embedding_model.clone(),
            configured: embedder.model_id().to_string(),
        });
    }
    debug!(
        alias = %handle.alias,
        retrieved = sources.len(),
        top_score = sources.first().map(|s| s.score),
        "Retrieved context"
    );
    if sources.is_empty() {
        warn!(alias = %handle.alias, "No passages retrieved; answering with empty context");
    }

    let prompt = build_prompt(question, &sources);
    let text = tokio::time::timeout(options.llm_timeout, llm.complete(&prompt))
        .await
        .map_err(|_| GenerationError::Timeout(options.llm_timeout))??;

    debug!(model = llm.model_id(), answer_len = text.len(), "Answer generated");
    Ok(Answer { text, sources })
}
