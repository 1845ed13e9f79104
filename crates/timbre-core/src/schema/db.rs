use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

use crate::checkpoint::CheckpointStore;
use crate::error::{Error, Result};
use crate::model::EmbeddingVector;

use super::migrations::MIGRATIONS;

/// How long a writer waits for another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite-backed checkpoint store.
///
/// Several pipeline processes may open the same file: WAL journaling and a
/// busy timeout serialize their writes, and `put` is an upsert so racing
/// workers converge on one row per uri.
#[derive(Debug)]
pub struct CheckpointDb {
    conn: Connection,
}

impl CheckpointDb {
    /// Open (or create) a checkpoint database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.configure()?;
        db.apply_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    fn configure(&self) -> Result<()> {
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = self
            .conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        log::debug!("Checkpoint database journal mode: {}", mode);
        self.conn.execute_batch("PRAGMA synchronous = FULL;")?;
        Ok(())
    }

    fn apply_migrations(&self) -> Result<()> {
        // Create migrations table if it doesn't exist
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }

    fn decode_embedding(uri: &str, json: &str, dimension: i64) -> Result<EmbeddingVector> {
        let values: Vec<f32> = serde_json::from_str(json)?;
        let width = usize::try_from(dimension).map_err(|_| {
            Error::InvalidData(format!("negative dimension {dimension} stored for {uri}"))
        })?;
        EmbeddingVector::with_width(values, width)
    }
}

impl CheckpointStore for CheckpointDb {
    fn has(&self, uri: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM checkpoints WHERE uri = ?1",
                [uri],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get(&self, uri: &str) -> Result<Option<EmbeddingVector>> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT embedding, dimension FROM checkpoints WHERE uri = ?1",
                [uri],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(json, dimension)| Self::decode_embedding(uri, &json, dimension))
            .transpose()
    }

    fn put(&self, uri: &str, embedding: &EmbeddingVector) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO checkpoints (uri, embedding, dimension, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(uri) DO UPDATE SET
                embedding = excluded.embedding,
                dimension = excluded.dimension,
                updated_at = excluded.updated_at",
            rusqlite::params![
                uri,
                serde_json::to_string(embedding)?,
                i64::try_from(embedding.len()).unwrap_or(i64::MAX),
                now,
            ],
        )?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uri FROM checkpoints ORDER BY uri")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
