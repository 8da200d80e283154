//! Vector store using SQLite
//!
//! Stores embeddings as BLOBs keyed by externally allocated vector ids and
//! computes cosine similarity in Rust.

use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use super::embedding::cosine_similarity;
use crate::core::error::{Error, Result};

/// SQLite's default host-parameter limit is 999; stay well below it
const MAX_PARAMS: usize = 500;

/// Vector store boundary used by the scanner, the orchestrator and search
pub trait VectorStore: Send + Sync {
    fn dimension(&self) -> usize;

    /// Insert `vectors[i]` under `ids[i]`
    fn add(&self, vectors: &[Vec<f32>], ids: &[i64]) -> Result<()>;

    /// Up to `top_k` `(id, similarity)` pairs, most similar first
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(i64, f32)>>;

    fn delete_by_ids(&self, ids: &[i64]) -> Result<()>;

    fn count(&self) -> Result<usize>;

    /// Drop every vector
    fn clear(&self) -> Result<()>;
}

/// SQLite-backed vector store. Each call opens its own connection.
pub struct SqliteVectorStore {
    db_path: PathBuf,
    dimension: usize,
}

impl SqliteVectorStore {
    /// Open or create the store; an existing store built with another
    /// dimension is rejected.
    pub fn open(db_path: &Path, dimension: usize) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
            dimension,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                id INTEGER PRIMARY KEY,
                embedding BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            "#,
        )?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored.and_then(|v| v.parse::<usize>().ok()) {
            Some(existing) if existing != self.dimension => Err(Error::DimensionMismatch {
                expected: existing,
                actual: self.dimension,
            }),
            Some(_) => Ok(()),
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimension', ?1)",
                    params![self.dimension.to_string()],
                )?;
                Ok(())
            }
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl VectorStore for SqliteVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn add(&self, vectors: &[Vec<f32>], ids: &[i64]) -> Result<()> {
        if vectors.len() != ids.len() {
            return Err(Error::IdCountMismatch {
                vectors: vectors.len(),
                ids: ids.len(),
            });
        }
        for vector in vectors {
            self.check_dimension(vector)?;
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO vectors (id, embedding) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding",
            )?;
            for (vector, id) in vectors.iter().zip(ids) {
                stmt.execute(params![id, embedding_to_blob(vector)])?;
            }
        }
        tx.commit()?;

        debug!(count = ids.len(), "vectors added");
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(i64, f32)>> {
        self.check_dimension(query)?;

        // O(n) scan; fine for a personal file collection
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, embedding FROM vectors")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            let embedding = blob_to_embedding(&blob);
            results.push((id, cosine_similarity(query, &embedding)));
        }

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    fn delete_by_ids(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for batch in ids.chunks(MAX_PARAMS) {
            let sql = format!(
                "DELETE FROM vectors WHERE id IN ({})",
                placeholders(batch.len())
            );
            tx.execute(&sql, params_from_iter(batch))?;
        }
        tx.commit()?;

        debug!(count = ids.len(), "vectors deleted");
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .connect()?
            .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn clear(&self) -> Result<()> {
        self.connect()?.execute("DELETE FROM vectors", [])?;
        Ok(())
    }
}

/// `?,?,?` for `n` parameters
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// Convert f32 embedding to little-endian BLOB
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Convert BLOB back to f32 embedding
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
