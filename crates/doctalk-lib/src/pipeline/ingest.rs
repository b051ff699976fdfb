use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::Document;
use crate::embedding::EmbeddingEngine;
use crate::error::{IndexError, IngestError};
use crate::extract::{check_size, extract_pages};
use crate::index::{ChunkPayload, CollectionSchema, Distance, IndexRecord, VectorIndex};
use crate::pipeline::chunker::{Chunk, ChunkConfig, chunk_pages};

/// Length of the document id prefix embedded in staging collection names.
const STAGING_ID_PREFIX: usize = 12;

/// Unaliased collections younger than this may still be mid-publish in
/// another process and are left alone by [`sweep_orphans`].
pub const ORPHAN_GRACE: Duration = Duration::from_secs(60 * 60);

/// Knobs of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Alias readers query. Re-pointed at the new collection on success.
    pub alias: String,
    pub chunk: ChunkConfig,
    pub distance: Distance,
    pub max_document_bytes: u64,
}

/// What a successful ingestion published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub alias: String,
    /// Physical collection the alias pointed at when the handle was made.
    pub collection: String,
    pub document_id: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
}

/// Stable record id for chunk `seq` of `document_id`.
pub fn record_id(document_id: &str, seq: u64) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{document_id}:{seq}").as_bytes(),
    )
    .to_string()
}

/// Fresh, never-reused collection name for one run. The trailing UUIDv7
/// carries the creation time.
pub fn staging_name(alias: &str, document_id: &str) -> String {
    let prefix = document_id.get(..STAGING_ID_PREFIX).unwrap_or(document_id);
    format!("{alias}-{prefix}-{}", Uuid::now_v7().simple())
}

/// Creation time encoded in a name built by [`staging_name`].
fn staged_at(name: &str) -> Option<SystemTime> {
    let (_, run_id) = name.rsplit_once('-')?;
    let (secs, nanos) = Uuid::try_parse(run_id).ok()?.get_timestamp()?.to_unix();
    UNIX_EPOCH.checked_add(Duration::new(secs, nanos))
}

/// Delete collections staged for `alias` that no alias points at and that
/// are older than `grace`. Left behind by runs that crashed or were dropped
/// mid-publish. Returns the names removed.
pub async fn sweep_orphans(
    index: &dyn VectorIndex,
    alias: &str,
    grace: Duration,
) -> Result<Vec<String>, IndexError> {
    let live: HashSet<String> = index
        .list_aliases()
        .await?
        .into_iter()
        .map(|binding| binding.collection)
        .collect();
    let prefix = format!("{alias}-");
    let now = SystemTime::now();

    let mut removed = Vec::new();
    for name in index.list_collections().await? {
        if !name.starts_with(&prefix) || live.contains(&name) {
            continue;
        }
        let Some(age) = staged_at(&name).and_then(|at| now.duration_since(at).ok()) else {
            continue;
        };
        if age < grace {
            continue;
        }
        match index.delete_collection(&name).await {
            Ok(()) => removed.push(name),
            Err(e) => warn!(collection = %name, error = %e, "Failed to drop orphaned collection"),
        }
    }
    if !removed.is_empty() {
        info!(alias = %alias, count = removed.len(), "Dropped orphaned staging collections");
    }
    Ok(removed)
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), IngestError> {
    if cancel.is_cancelled() {
        return Err(IngestError::Cancelled);
    }
    Ok(())
}

/// Run extract, chunk, embed and index for `document`.
///
/// Records are written to a staging collection that becomes visible through
/// `options.alias` only once every record is stored. On failure or
/// cancellation the staging collection is removed and the alias keeps
/// pointing at whatever it pointed at before.
pub async fn run_ingest(
    document: &Document,
    options: &IngestOptions,
    embedder: &EmbeddingEngine,
    index: &dyn VectorIndex,
    cancel: &CancellationToken,
) -> Result<CollectionHandle, IngestError> {
    check_size(document, options.max_document_bytes)?;
    ensure_live(cancel)?;

    let pages = tokio::select! {
        () = cancel.cancelled() => return Err(IngestError::Cancelled),
        pages = extract_pages(document) => pages?,
    };
    ensure_live(cancel)?;

    let chunks = chunk_pages(document.id(), &pages, options.chunk);
    debug!(
        document_id = %document.id(),
        page_count = pages.len(),
        chunk_count = chunks.len(),
        "Chunked document"
    );
    if chunks.is_empty() {
        warn!(
            document_id = %document.id(),
            page_count = pages.len(),
            "Document has no extractable text; publishing an empty collection"
        );
    }

    let vectors = embed_chunks(&chunks, embedder, cancel).await?;
    let records = build_records(chunks, vectors, embedder.model_id());

    let staging = staging_name(&options.alias, document.id());
    let schema = CollectionSchema {
        dimension: embedder.dimension(),
        distance: options.distance,
        embedding_model: embedder.model_id().to_string(),
    };

    match publish(index, &staging, &schema, &records, &options.alias, cancel).await {
        Ok(previous) => {
            if let Some(previous) = previous.filter(|p| *p != staging)
                && let Err(e) = index.delete_collection(&previous).await
            {
                warn!(collection = %previous, error = %e, "Failed to drop replaced collection");
            }
            info!(
                document_id = %document.id(),
                alias = %options.alias,
                collection = %staging,
                chunk_count = records.len(),
                "Ingested document"
            );
            Ok(CollectionHandle {
                alias: options.alias.clone(),
                collection: staging,
                document_id: document.id().to_string(),
                embedding_model: embedder.model_id().to_string(),
                dimension: schema.dimension,
                chunk_count: records.len(),
            })
        }
        Err(e) => {
            if let Err(cleanup) = index.delete_collection(&staging).await {
                warn!(collection = %staging, error = %cleanup, "Failed to drop staging collection");
            }
            warn!(
                document_id = %document.id(),
                stage = ?e.stage(),
                error = %e,
                "Ingestion aborted"
            );
            Err(e)
        }
    }
}

async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &EmbeddingEngine,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>, IngestError> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut vectors = Vec::with_capacity(texts.len());
    for (batch_no, batch) in texts.chunks(embedder.batch_size()).enumerate() {
        ensure_live(cancel)?;
        let embedded = tokio::select! {
            () = cancel.cancelled() => return Err(IngestError::Cancelled),
            embedded = embedder.embed_slice(batch) => embedded?,
        };
        vectors.extend(embedded);
        debug!(batch = batch_no, embedded = vectors.len(), total = texts.len(), "Embedded batch");
    }
    Ok(vectors)
}

fn build_records(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>, model_id: &str) -> Vec<IndexRecord> {
    chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexRecord {
            id: record_id(&chunk.document_id, chunk.seq),
            vector,
            payload: ChunkPayload {
                document_id: chunk.document_id,
                page: chunk.page,
                offset: chunk.offset,
                overlap: chunk.overlap,
                seq: chunk.seq,
                embedding_model: model_id.to_string(),
                text: chunk.text,
            },
        })
        .collect()
}

/// Create and fill the staging collection, then swap the alias onto it.
async fn publish(
    index: &dyn VectorIndex,
    staging: &str,
    schema: &CollectionSchema,
    records: &[IndexRecord],
    alias: &str,
    cancel: &CancellationToken,
) -> Result<Option<String>, IngestError> {
    ensure_live(cancel)?;
    index.ensure_collection(staging, schema).await?;
    ensure_live(cancel)?;
    index.upsert(staging, records).await?;
    ensure_live(cancel)?;
    Ok(index.point_alias(alias, staging).await?)
}
