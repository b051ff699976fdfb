use rusqlite::Connection;
use rusqlite_migration::{M, Migrations};

/// Define all schema migrations.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // v1: collections, their records and the aliases sessions query through
        M::up(
            "CREATE TABLE collections (
                name         TEXT PRIMARY KEY,
                dimension    INTEGER NOT NULL,
                distance     TEXT NOT NULL,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE records (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                collection   TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
                id           TEXT NOT NULL,
                vector       BLOB NOT NULL,
                payload      TEXT NOT NULL,
                UNIQUE(collection, id)
            );

            CREATE INDEX idx_records_collection ON records(collection, seq);

            CREATE TABLE aliases (
                alias        TEXT PRIMARY KEY,
                collection   TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE
            );",
        ),
        // v2: embedding model that produced a collection's vectors
        M::up("ALTER TABLE collections ADD COLUMN embedding_model TEXT NOT NULL DEFAULT '';"),
    ])
}

/// Apply all pending migrations to the database.
pub fn apply_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    migrations()
        .to_latest(conn)
        .map_err(|e| anyhow::anyhow!("Failed to apply migrations: {e}"))?;
    Ok(())
}
