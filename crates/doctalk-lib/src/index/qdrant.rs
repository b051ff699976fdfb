//! Qdrant client over its HTTP/JSON API.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    AliasBinding, ChunkPayload, CollectionSchema, Distance, IndexRecord, ScoredRecord,
    VectorIndex, rank,
};
use crate::error::IndexError;

/// Points sent per upsert request.
const UPSERT_BATCH: usize = 256;

/// Extra hits requested beyond `k` so score ties at the cut are settled by
/// our own ordering rather than Qdrant's.
const TIE_HEADROOM: usize = 8;

#[derive(Clone)]
pub struct QdrantIndex {
    client: Client,
    base_url: Url,
    /// Retries after the first attempt.
    max_retries: usize,
}

impl QdrantIndex {
    pub fn new(base_url: &str, timeout: Duration, max_retries: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "Qdrant endpoint must be an http(s) URL"
        );
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid Qdrant URL {base_url}"))?;
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Qdrant HTTP client")?;
        Ok(Self {
            client,
            base_url,
            max_retries,
        })
    }

    /// Endpoint URL with each of `segments` percent-encoded as one path
    /// segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request, retrying transport failures, 429 and 5xx with backoff.
    async fn send<F>(&self, build: F) -> Result<Response, IndexError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0usize;
        loop {
            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(status = %status, attempt, "Qdrant request failed, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    let retryable = err.is_connect() || err.is_timeout() || err.is_request();
                    if retryable && attempt < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "Qdrant unreachable, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(IndexError::Unavailable(err.to_string()));
                }
            }
        }
    }

    async fn search_once(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        let url = self.url(&["collections", collection, "points", "search"]);
        let body = SearchRequest {
            vector: query,
            limit,
            with_payload: true,
        };
        let resp = self.send(|| self.client.post(url.clone()).json(&body)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(IndexError::CollectionNotFound(collection.to_string()));
        }
        let hits: Vec<SearchHit> = parse_result(resp).await?;

        hits.into_iter()
            .map(|hit| {
                let id = hit.id.into_string();
                let payload = hit
                    .payload
                    .ok_or_else(|| IndexError::Backend(format!("point {id} has no payload")))?;
                Ok(ScoredRecord {
                    id,
                    score: hit.score,
                    payload,
                })
            })
            .collect()
    }
}

/// True when hits beyond the ones returned could tie with the `k`-th.
fn cut_may_split_tie(ranked: &[ScoredRecord], k: usize, limit: usize) -> bool {
    if ranked.len() < limit || k == 0 {
        return false;
    }
    match (ranked.get(k - 1), ranked.last()) {
        (Some(kth), Some(last)) => kth.score.total_cmp(&last.score).is_eq(),
        _ => false,
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = u32::try_from(attempt.min(5)).unwrap_or(5);
    Duration::from_millis(500 * (1 << capped))
}

/// Decode the `result` field of a successful response.
async fn parse_result<T: DeserializeOwned>(resp: Response) -> Result<T, IndexError> {
    let status = resp.status();
    if status.is_success() {
        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| IndexError::Backend(format!("failed to parse Qdrant response: {e}")))?;
        return Ok(envelope.result);
    }
    Err(status_error(status, resp).await)
}

async fn status_error(status: StatusCode, resp: Response) -> IndexError {
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        IndexError::Unavailable(format!("Qdrant returned {status}: {body}"))
    } else {
        IndexError::Backend(format!("Qdrant returned {status}: {body}"))
    }
}

fn distance_name(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "Cosine",
        Distance::Dot => "Dot",
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
    metadata: CollectionMetadata,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionMetadata {
    #[serde(default)]
    embedding_model: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
    #[serde(default)]
    metadata: Option<CollectionMetadata>,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct UpsertPoints<'a> {
    points: Vec<Point<'a>>,
}

#[derive(Serialize)]
struct Point<'a> {
    id: &'a str,
    vector: &'a [f32],
    payload: &'a ChunkPayload,
}

#[derive(Serialize)]
struct CountRequest {
    exact: bool,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointId {
    Num(u64),
    Uuid(String),
}

impl PointId {
    fn into_string(self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Uuid(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: PointId,
    score: f32,
    payload: Option<ChunkPayload>,
}

#[derive(Serialize)]
struct AliasActions<'a> {
    actions: Vec<AliasAction<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum AliasAction<'a> {
    DeleteAlias { alias_name: &'a str },
    CreateAlias { collection_name: &'a str, alias_name: &'a str },
}

#[derive(Debug, Deserialize)]
struct AliasList {
    aliases: Vec<AliasDescription>,
}

#[derive(Debug, Deserialize)]
struct AliasDescription {
    alias_name: String,
    collection_name: String,
}

#[derive(Debug, Deserialize)]
struct CollectionList {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), IndexError> {
        if let Some(existing) = self.collection_schema(name).await? {
            return schema.check_compatible(name, &existing);
        }

        debug!(collection = %name, dimension = schema.dimension, "Creating Qdrant collection");
        let url = self.url(&["collections", name]);
        let body = CreateCollection {
            vectors: VectorParams {
                size: schema.dimension,
                distance: distance_name(schema.distance).to_string(),
            },
            metadata: CollectionMetadata {
                embedding_model: schema.embedding_model.clone(),
            },
        };
        let resp = self.send(|| self.client.put(url.clone()).json(&body)).await?;
        let _: serde_json::Value = parse_result(resp).await?;
        Ok(())
    }

    async fn collection_schema(&self, name: &str) -> Result<Option<CollectionSchema>, IndexError> {
        let url = self.url(&["collections", name]);
        let resp = self.send(|| self.client.get(url.clone())).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: CollectionInfo = parse_result(resp).await?;
        let embedding_model = info
            .config
            .metadata
            .map(|m| m.embedding_model)
            .unwrap_or_default();
        let vectors = info.config.params.vectors;
        let distance = Distance::parse(&vectors.distance).ok_or_else(|| {
            IndexError::Backend(format!(
                "collection '{name}' uses unsupported distance {}",
                vectors.distance
            ))
        })?;
        Ok(Some(CollectionSchema {
            dimension: vectors.size,
            distance,
            embedding_model,
        }))
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), IndexError> {
        let mut url = self.url(&["collections", collection, "points"]);
        url.set_query(Some("wait=true"));
        for batch in records.chunks(UPSERT_BATCH) {
            let body = UpsertPoints {
                points: batch
                    .iter()
                    .map(|r| Point {
                        id: &r.id,
                        vector: &r.vector,
                        payload: &r.payload,
                    })
                    .collect(),
            };
            let resp = self.send(|| self.client.put(url.clone()).json(&body)).await?;
            let _: serde_json::Value = parse_result(resp).await?;
        }
        debug!(collection = %collection, count = records.len(), "Upserted points");
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<usize, IndexError> {
        let url = self.url(&["collections", name, "points", "count"]);
        let body = CountRequest { exact: true };
        let resp = self.send(|| self.client.post(url.clone()).json(&body)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(IndexError::CollectionNotFound(name.to_string()));
        }
        let result: CountResult = parse_result(resp).await?;
        Ok(result.count)
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        let mut limit = k.saturating_add(TIE_HEADROOM);
        let mut records = loop {
            let mut records = self.search_once(collection, query, limit).await?;
            rank(&mut records);
            if !cut_may_split_tie(&records, k, limit) {
                break records;
            }
            debug!(collection = %collection, limit, "Tie at the result limit, widening search");
            limit = limit.saturating_mul(2);
        };
        records.truncate(k);

        debug!(
            collection = %collection,
            k = k,
            result_count = records.len(),
            "Vector search completed"
        );
        Ok(records)
    }

    async fn point_alias(
        &self,
        alias: &str,
        collection: &str,
    ) -> Result<Option<String>, IndexError> {
        let previous = self.resolve_alias(alias).await?;
        let mut actions = Vec::with_capacity(2);
        if previous.is_some() {
            actions.push(AliasAction::DeleteAlias { alias_name: alias });
        }
        actions.push(AliasAction::CreateAlias {
            collection_name: collection,
            alias_name: alias,
        });

        // Both actions are applied by Qdrant as one operation.
        let url = self.url(&["collections", "aliases"]);
        let body = AliasActions { actions };
        let resp = self.send(|| self.client.post(url.clone()).json(&body)).await?;
        let _: serde_json::Value = parse_result(resp).await?;
        Ok(previous)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, IndexError> {
        Ok(self
            .list_aliases()
            .await?
            .into_iter()
            .find(|a| a.alias == alias)
            .map(|a| a.collection))
    }

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        let url = self.url(&["collections", name]);
        let resp = self.send(|| self.client.delete(url.clone())).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let _: serde_json::Value = parse_result(resp).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        let url = self.url(&["collections"]);
        let resp = self.send(|| self.client.get(url.clone())).await?;
        let list: CollectionList = parse_result(resp).await?;
        Ok(list.collections.into_iter().map(|c| c.name).collect())
    }

    async fn list_aliases(&self) -> Result<Vec<AliasBinding>, IndexError> {
        let url = self.url(&["aliases"]);
        let resp = self.send(|| self.client.get(url.clone())).await?;
        let list: AliasList = parse_result(resp).await?;
        Ok(list
            .aliases
            .into_iter()
            .map(|a| AliasBinding {
                alias: a.alias_name,
                collection: a.collection_name,
            })
            .collect())
    }
}
