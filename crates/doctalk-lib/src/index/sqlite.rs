#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

//! Embedded vector index on a local SQLite file.
//!
//! Search is a full scan over the collection's vectors; fine for the few
//! thousand chunks a single PDF produces.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::schema::apply_migrations;
use super::{
    AliasBinding, CollectionSchema, Distance, IndexRecord, ScoredRecord, VectorIndex, rank,
};
use crate::error::IndexError;

pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIndex {
    /// Open (or create) the database at `path`. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if path == Path::new(":memory:") {
            return Self::in_memory();
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open index database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> anyhow::Result<Self> {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            .context("Failed to enable WAL journal")?;
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("Failed to configure index database")?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, IndexError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| IndexError::Unavailable("index connection poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| IndexError::Backend(format!("index task failed: {e}")))?
    }
}

fn backend(err: impl std::fmt::Display) -> IndexError {
    IndexError::Backend(err.to_string())
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Follow `name` through the alias table, if it is an alias.
fn resolve(conn: &Connection, name: &str) -> Result<String, IndexError> {
    let target: Option<String> = conn
        .query_row(
            "SELECT collection FROM aliases WHERE alias = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(backend)?;
    Ok(target.unwrap_or_else(|| name.to_string()))
}

fn load_schema(conn: &Connection, collection: &str) -> Result<Option<CollectionSchema>, IndexError> {
    let row: Option<(i64, String, String)> = conn
        .query_row(
            "SELECT dimension, distance, embedding_model FROM collections WHERE name = ?1",
            params![collection],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(backend)?;

    row.map(|(dimension, distance, embedding_model)| {
        let distance = Distance::parse(&distance)
            .ok_or_else(|| backend(format!("unknown distance '{distance}' on '{collection}'")))?;
        Ok(CollectionSchema {
            dimension: dimension as usize,
            distance,
            embedding_model,
        })
    })
    .transpose()
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), IndexError> {
        let name = name.to_string();
        let schema = schema.clone();
        self.with_conn(move |conn| {
            if let Some(existing) = load_schema(conn, &name)? {
                return schema.check_compatible(&name, &existing);
            }
            debug!(collection = %name, dimension = schema.dimension, "Creating collection");
            conn.execute(
                "INSERT INTO collections (name, dimension, distance, embedding_model)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    name,
                    schema.dimension as i64,
                    schema.distance.as_str(),
                    schema.embedding_model
                ],
            )
            .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn collection_schema(&self, name: &str) -> Result<Option<CollectionSchema>, IndexError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let collection = resolve(conn, &name)?;
            load_schema(conn, &collection)
        })
        .await
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), IndexError> {
        let collection = collection.to_string();
        let records = records.to_vec();
        self.with_conn(move |conn| {
            let schema = load_schema(conn, &collection)?
                .ok_or_else(|| IndexError::CollectionNotFound(collection.clone()))?;

            let tx = conn.transaction().map_err(backend)?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO records (collection, id, vector, payload)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(collection, id) DO UPDATE SET
                           vector = excluded.vector,
                           payload = excluded.payload",
                    )
                    .map_err(backend)?;
                for record in &records {
                    if record.vector.len() != schema.dimension {
                        // Dropping `tx` without commit rolls the batch back.
                        return Err(backend(format!(
                            "record {} has {} dimensions, collection '{collection}' expects {}",
                            record.id,
                            record.vector.len(),
                            schema.dimension
                        )));
                    }
                    let payload = serde_json::to_string(&record.payload).map_err(backend)?;
                    stmt.execute(params![
                        collection,
                        record.id,
                        encode_vector(&record.vector),
                        payload
                    ])
                    .map_err(backend)?;
                }
            }
            tx.commit().map_err(backend)?;

            debug!(collection = %collection, count = records.len(), "Upserted records");
            Ok(())
        })
        .await
    }

    async fn count(&self, name: &str) -> Result<usize, IndexError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let target = resolve(conn, &name)?;
            if load_schema(conn, &target)?.is_none() {
                return Err(IndexError::CollectionNotFound(name));
            }
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM records WHERE collection = ?1",
                    params![target],
                    |row| row.get(0),
                )
                .map_err(backend)?;
            Ok(count as usize)
        })
        .await
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, IndexError> {
        let collection = collection.to_string();
        let query = query.to_vec();
        self.with_conn(move |conn| {
            let target = resolve(conn, &collection)?;
            let schema = load_schema(conn, &target)?
                .ok_or_else(|| IndexError::CollectionNotFound(collection.clone()))?;

            let mut stmt = conn
                .prepare("SELECT id, vector, payload FROM records WHERE collection = ?1 ORDER BY seq")
                .map_err(backend)?;
            let rows = stmt
                .query_map(params![target], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(backend)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(backend)?;

            let mut hits = Vec::with_capacity(rows.len());
            for (id, vector, payload) in rows {
                let vector = decode_vector(&vector);
                hits.push(ScoredRecord {
                    score: schema.distance.score(&query, &vector),
                    payload: serde_json::from_str(&payload).map_err(backend)?,
                    id,
                });
            }
            rank(&mut hits);
            hits.truncate(k);

            debug!(
                collection = %collection,
                resolved = %target,
                k = k,
                result_count = hits.len(),
                "Vector search completed"
            );
            Ok(hits)
        })
        .await
    }

    async fn point_alias(
        &self,
        alias: &str,
        collection: &str,
    ) -> Result<Option<String>, IndexError> {
        let alias = alias.to_string();
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(backend)?;
            if load_schema(&tx, &collection)?.is_none() {
                return Err(IndexError::CollectionNotFound(collection));
            }
            let previous: Option<String> = tx
                .query_row(
                    "SELECT collection FROM aliases WHERE alias = ?1",
                    params![alias],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend)?;
            tx.execute(
                "INSERT INTO aliases (alias, collection) VALUES (?1, ?2)
                 ON CONFLICT(alias) DO UPDATE SET collection = excluded.collection",
                params![alias, collection],
            )
            .map_err(backend)?;
            tx.commit().map_err(backend)?;
            Ok(previous)
        })
        .await
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, IndexError> {
        let alias = alias.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT collection FROM aliases WHERE alias = ?1",
                params![alias],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)
        })
        .await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            // Records and aliases go with it (ON DELETE CASCADE).
            let deleted = conn
                .execute("DELETE FROM collections WHERE name = ?1", params![name])
                .map_err(backend)?;
            debug!(collection = %name, deleted = deleted > 0, "Deleted collection");
            Ok(())
        })
        .await
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM collections ORDER BY name")
                .map_err(backend)?;
            stmt.query_map([], |row| row.get(0))
                .map_err(backend)?
                .collect::<Result<Vec<String>, _>>()
                .map_err(backend)
        })
        .await
    }

    async fn list_aliases(&self) -> Result<Vec<AliasBinding>, IndexError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT alias, collection FROM aliases ORDER BY alias")
                .map_err(backend)?;
            stmt.query_map([], |row| {
                Ok(AliasBinding {
                    alias: row.get(0)?,
                    collection: row.get(1)?,
                })
            })
            .map_err(backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkPayload;

    fn schema() -> CollectionSchema {
        CollectionSchema {
            dimension: 3,
            distance: Distance::Cosine,
            embedding_model: "test-model".to_string(),
        }
    }

    fn record(id: &str, seq: u64, vector: [f32; 3], text: &str) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            vector: vector.to_vec(),
            payload: ChunkPayload {
                document_id: "doc-a".to_string(),
                page: 0,
                offset: 0,
                overlap: 0,
                seq,
                embedding_model: "test-model".to_string(),
                text: text.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        assert_eq!(index.collection_schema("c").await.unwrap(), Some(schema()));
    }

    #[tokio::test]
    async fn ensure_collection_detects_schema_mismatch() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        let other = CollectionSchema {
            dimension: 4,
            ..schema()
        };
        let err = index.ensure_collection("c", &other).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::SchemaMismatch {
                expected_dimension: 4,
                actual_dimension: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn ensure_collection_detects_model_mismatch() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        let other = CollectionSchema {
            embedding_model: "other-model".to_string(),
            ..schema()
        };
        let err = index.ensure_collection("c", &other).await.unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { actual, .. } if actual == "test-model"));
    }

    #[tokio::test]
    async fn search_on_empty_collection_returns_nothing() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        let hits = index.search("c", &[1.0, 0.0, 0.0], 4).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn search_on_missing_collection_is_not_found() {
        let index = SqliteIndex::in_memory().unwrap();
        let err = index.search("nope", &[1.0, 0.0, 0.0], 4).await.unwrap_err();
        assert!(matches!(err, IndexError::CollectionNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn search_orders_by_score_and_truncates() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        index
            .upsert(
                "c",
                &[
                    record("a", 0, [0.0, 1.0, 0.0], "far"),
                    record("b", 1, [1.0, 0.0, 0.0], "exact"),
                    record("c", 2, [0.7, 0.7, 0.0], "near"),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("c", &[1.0, 0.0, 0.0], 2).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.payload.text.as_str()).collect();
        assert_eq!(texts, vec!["exact", "near"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        index
            .upsert(
                "c",
                &[
                    record("x", 0, [1.0, 0.0, 0.0], "first"),
                    record("y", 1, [1.0, 0.0, 0.0], "second"),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("c", &[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].payload.text, "first");
        assert_eq!(hits[1].payload.text, "second");
    }

    #[tokio::test]
    async fn upsert_replaces_records_with_same_id() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        index
            .upsert("c", &[record("a", 0, [1.0, 0.0, 0.0], "old")])
            .await
            .unwrap();
        index
            .upsert("c", &[record("a", 0, [1.0, 0.0, 0.0], "new")])
            .await
            .unwrap();

        let hits = index.search("c", &[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.text, "new");
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        let mut bad = record("b", 1, [1.0, 0.0, 0.0], "bad");
        bad.vector.push(0.0);

        let err = index
            .upsert("c", &[record("a", 0, [1.0, 0.0, 0.0], "good"), bad])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Backend(_)));

        let hits = index.search("c", &[1.0, 0.0, 0.0], 10).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(index.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn count_follows_alias() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("gen-1", &schema()).await.unwrap();
        index
            .upsert(
                "gen-1",
                &[
                    record("a", 0, [1.0, 0.0, 0.0], "one"),
                    record("b", 1, [0.0, 1.0, 0.0], "two"),
                ],
            )
            .await
            .unwrap();
        index.point_alias("live", "gen-1").await.unwrap();
        assert_eq!(index.count("live").await.unwrap(), 2);
        assert!(matches!(
            index.count("ghost").await.unwrap_err(),
            IndexError::CollectionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn alias_swap_returns_previous_and_redirects_search() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("gen-1", &schema()).await.unwrap();
        index.ensure_collection("gen-2", &schema()).await.unwrap();
        index
            .upsert("gen-1", &[record("a", 0, [1.0, 0.0, 0.0], "one")])
            .await
            .unwrap();
        index
            .upsert("gen-2", &[record("a", 0, [1.0, 0.0, 0.0], "two")])
            .await
            .unwrap();

        assert_eq!(index.point_alias("live", "gen-1").await.unwrap(), None);
        assert_eq!(
            index.point_alias("live", "gen-2").await.unwrap(),
            Some("gen-1".to_string())
        );
        assert_eq!(
            index.resolve_alias("live").await.unwrap(),
            Some("gen-2".to_string())
        );

        let hits = index.search("live", &[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(hits[0].payload.text, "two");
        assert_eq!(index.collection_schema("live").await.unwrap(), Some(schema()));
    }

    #[tokio::test]
    async fn alias_to_missing_collection_is_rejected() {
        let index = SqliteIndex::in_memory().unwrap();
        let err = index.point_alias("live", "ghost").await.unwrap_err();
        assert!(matches!(err, IndexError::CollectionNotFound(_)));
        assert_eq!(index.resolve_alias("live").await.unwrap(), None);
    }

    #[tokio::test]
    async fn listing_reports_collections_and_aliases() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("gen-2", &schema()).await.unwrap();
        index.ensure_collection("gen-1", &schema()).await.unwrap();
        index.point_alias("live", "gen-2").await.unwrap();

        assert_eq!(
            index.list_collections().await.unwrap(),
            vec!["gen-1".to_string(), "gen-2".to_string()]
        );
        assert_eq!(
            index.list_aliases().await.unwrap(),
            vec![AliasBinding {
                alias: "live".to_string(),
                collection: "gen-2".to_string(),
            }]
        );

        index.delete_collection("gen-2").await.unwrap();
        assert!(index.list_aliases().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn waiting_for_the_connection_does_not_stall_the_runtime() {
        let index = Arc::new(SqliteIndex::in_memory().unwrap());
        index.ensure_collection("c", &schema()).await.unwrap();
        index
            .upsert("c", &[record("a", 0, [1.0, 0.0, 0.0], "only")])
            .await
            .unwrap();

        // Another thread holds the connection, as a long scan would.
        let conn = Arc::clone(&index.conn);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = conn.lock().unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        let search = {
            let index = Arc::clone(&index);
            tokio::spawn(async move { index.search("c", &[1.0, 0.0, 0.0], 1).await })
        };
        let started = std::time::Instant::now();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(200));

        assert_eq!(search.await.unwrap().unwrap().len(), 1);
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn delete_collection_is_idempotent() {
        let index = SqliteIndex::in_memory().unwrap();
        index.ensure_collection("c", &schema()).await.unwrap();
        index.delete_collection("c").await.unwrap();
        index.delete_collection("c").await.unwrap();
        assert_eq!(index.collection_schema("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("index.db");
        {
            let index = SqliteIndex::open(&path).unwrap();
            index.ensure_collection("c", &schema()).await.unwrap();
            index
                .upsert("c", &[record("a", 0, [1.0, 0.0, 0.0], "kept")])
                .await
                .unwrap();
            index.point_alias("live", "c").await.unwrap();
        }
        let index = SqliteIndex::open(&path).unwrap();
        let hits = index.search("live", &[1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].payload.text, "kept");
        assert_eq!(
            index.collection_schema("live").await.unwrap().unwrap().embedding_model,
            "test-model"
        );
    }

    #[test]
    fn vector_encoding_round_trips() {
        let v = vec![0.25_f32, -1.5, 3.0];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }
}
