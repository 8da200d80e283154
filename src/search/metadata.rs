//! Relational metadata store (SQLite)
//!
//! Files, tags, file↔tag links and the vector-id mapping. Each operation
//! opens its own short-lived connection so worker, watcher and search
//! threads never share a handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

use super::vectordb::placeholders;
use crate::core::error::Result;
use crate::core::paths::{extension_of, path_key};

const MAX_PARAMS: usize = 500;

pub const DEFAULT_TAG_COLOR: &str = "#007acc";

/// Indexed file row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub extension: String,
    /// Modification time in nanoseconds since the Unix epoch
    pub last_modified: i64,
    /// Unix seconds
    pub indexed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagLogic {
    /// File must carry every tag
    #[default]
    And,
    /// File must carry at least one tag
    Or,
}

#[derive(Debug, Serialize)]
pub struct MetadataStats {
    pub file_count: usize,
    pub vector_ref_count: usize,
    pub tag_count: usize,
    pub last_indexed: Option<i64>,
}

pub struct MetadataStore {
    db_path: PathBuf,
}

impl MetadataStore {
    /// Open or create database at path
    pub fn open(db_path: &Path) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                extension TEXT NOT NULL,
                last_modified INTEGER NOT NULL,
                indexed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                color TEXT NOT NULL DEFAULT '#007acc',
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );

            CREATE TABLE IF NOT EXISTS file_tags (
                file_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (file_id, tag_id),
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            -- id doubles as the vector store id
            CREATE TABLE IF NOT EXISTS file_vectors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_file_vectors_file ON file_vectors(file_id);
            CREATE INDEX IF NOT EXISTS idx_file_tags_tag ON file_tags(tag_id);
            "#,
        )?;
        Ok(())
    }

    // ===== Files =====

    /// Insert or refresh a file row; returns its id
    pub fn upsert_file(&self, path: &Path, last_modified: i64) -> Result<i64> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let now = chrono::Utc::now().timestamp();

        let conn = self.connect()?;
        let id = conn.query_row(
            r#"
            INSERT INTO files (path, name, extension, last_modified, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(path) DO UPDATE SET
                last_modified = excluded.last_modified,
                indexed_at = excluded.indexed_at
            RETURNING id
            "#,
            params![path_key(path), name, extension_of(path), last_modified, now],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Record the modification time a completed scan saw
    pub fn set_last_modified(&self, file_id: i64, last_modified: i64) -> Result<()> {
        self.connect()?.execute(
            "UPDATE files SET last_modified = ?1 WHERE id = ?2",
            params![last_modified, file_id],
        )?;
        Ok(())
    }

    pub fn get_file(&self, path: &Path) -> Result<Option<FileRecord>> {
        let record = self
            .connect()?
            .query_row(
                "SELECT id, path, name, extension, last_modified, indexed_at FROM files WHERE path = ?1",
                params![path_key(path)],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn file_id(&self, path: &Path) -> Result<Option<i64>> {
        let id = self
            .connect()?
            .query_row(
                "SELECT id FROM files WHERE path = ?1",
                params![path_key(path)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Returns whether a row was deleted. Links and vector refs cascade.
    pub fn delete_file(&self, path: &Path) -> Result<bool> {
        let deleted = self
            .connect()?
            .execute("DELETE FROM files WHERE path = ?1", params![path_key(path)])?;
        Ok(deleted > 0)
    }

    /// Files equal to or beneath `prefix`
    pub fn files_under(&self, prefix: &Path) -> Result<Vec<FileRecord>> {
        let exact = path_key(prefix);
        let mut dir = exact.clone();
        if !dir.ends_with(MAIN_SEPARATOR) {
            dir.push(MAIN_SEPARATOR);
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, path, name, extension, last_modified, indexed_at FROM files
            WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2
            ORDER BY path
            "#,
        )?;
        let rows = stmt.query_map(params![exact, dir], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_files(&self, ids: &[i64]) -> Result<usize> {
        self.execute_in_batches("DELETE FROM files WHERE id IN ({})", ids)
    }

    pub fn all_files(&self) -> Result<Vec<FileRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, path, name, extension, last_modified, indexed_at FROM files ORDER BY path",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ===== Vector ids =====

    /// Reserve `count` fresh vector ids owned by `file_id`
    pub fn allocate_vector_ids(&self, file_id: i64, count: usize) -> Result<Vec<i64>> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(count);
        {
            let mut stmt = tx.prepare("INSERT INTO file_vectors (file_id) VALUES (?1)")?;
            for _ in 0..count {
                stmt.execute(params![file_id])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    pub fn vector_ids_for_file(&self, file_id: i64) -> Result<Vec<i64>> {
        self.vector_ids_for_files(&[file_id])
    }

    pub fn vector_ids_for_files(&self, file_ids: &[i64]) -> Result<Vec<i64>> {
        let conn = self.connect()?;
        let mut ids = Vec::new();
        for batch in file_ids.chunks(MAX_PARAMS) {
            let sql = format!(
                "SELECT id FROM file_vectors WHERE file_id IN ({}) ORDER BY id",
                placeholders(batch.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(batch), |row| row.get(0))?;
            for row in rows {
                ids.push(row?);
            }
        }
        Ok(ids)
    }

    pub fn delete_vector_ids(&self, ids: &[i64]) -> Result<usize> {
        self.execute_in_batches("DELETE FROM file_vectors WHERE id IN ({})", ids)
    }

    /// vector id -> owning file path
    pub fn paths_for_vector_ids(&self, ids: &[i64]) -> Result<HashMap<i64, String>> {
        let conn = self.connect()?;
        let mut result = HashMap::new();
        for batch in ids.chunks(MAX_PARAMS) {
            let sql = format!(
                "SELECT fv.id, f.path FROM file_vectors fv JOIN files f ON fv.file_id = f.id WHERE fv.id IN ({})",
                placeholders(batch.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(batch), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, path) = row?;
                result.insert(id, path);
            }
        }
        Ok(result)
    }

    // ===== Tags =====

    /// Create the tag if missing; returns its id
    pub fn add_tag(&self, name: &str, color: &str) -> Result<i64> {
        let conn = self.connect()?;
        Self::ensure_tag(&conn, name, color)
    }

    fn ensure_tag(conn: &Connection, name: &str, color: &str) -> Result<i64> {
        conn.execute(
            "INSERT OR IGNORE INTO tags (name, color) VALUES (?1, ?2)",
            params![name, color],
        )?;
        let id = conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
            row.get(0)
        })?;
        Ok(id)
    }

    pub fn all_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT name, color FROM tags ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Tag {
                name: row.get(0)?,
                color: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Tag vocabulary handed to the tagging service
    pub fn tag_names(&self) -> Result<Vec<String>> {
        Ok(self.all_tags()?.into_iter().map(|t| t.name).collect())
    }

    pub fn delete_tag(&self, name: &str) -> Result<bool> {
        let deleted = self
            .connect()?
            .execute("DELETE FROM tags WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }

    /// False if `old` does not exist or `new` is already taken
    pub fn rename_tag(&self, old: &str, new: &str) -> Result<bool> {
        match self
            .connect()?
            .execute("UPDATE tags SET name = ?1 WHERE name = ?2", params![new, old])
        {
            Ok(updated) => Ok(updated > 0),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_tag_color(&self, name: &str, color: &str) -> Result<bool> {
        let updated = self.connect()?.execute(
            "UPDATE tags SET color = ?1 WHERE name = ?2",
            params![color, name],
        )?;
        Ok(updated > 0)
    }

    /// Link `tag` (created if missing) to an indexed file.
    /// Returns false if the file has no record.
    pub fn link_file_tag(&self, path: &Path, tag: &str) -> Result<bool> {
        let conn = self.connect()?;
        let file_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM files WHERE path = ?1",
                params![path_key(path)],
                |row| row.get(0),
            )
            .optional()?;
        let Some(file_id) = file_id else {
            return Ok(false);
        };

        let tag_id = Self::ensure_tag(&conn, tag, DEFAULT_TAG_COLOR)?;
        conn.execute(
            "INSERT OR IGNORE INTO file_tags (file_id, tag_id) VALUES (?1, ?2)",
            params![file_id, tag_id],
        )?;
        Ok(true)
    }

    /// Replace the tag set of a file. A file that exists on disk but has no
    /// record yet is registered first. Returns false if neither is true.
    pub fn set_file_tags(&self, path: &Path, tags: &[String]) -> Result<bool> {
        let file_id = match self.file_id(path)? {
            Some(id) => id,
            None => match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => {
                    let mtime = meta.modified().map(mtime_nanos).unwrap_or_default();
                    self.upsert_file(path, mtime)?
                }
                _ => return Ok(false),
            },
        };

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM file_tags WHERE file_id = ?1", params![file_id])?;
        for tag in tags {
            let tag_id = Self::ensure_tag(&tx, tag, DEFAULT_TAG_COLOR)?;
            tx.execute(
                "INSERT OR IGNORE INTO file_tags (file_id, tag_id) VALUES (?1, ?2)",
                params![file_id, tag_id],
            )?;
        }
        tx.commit()?;
        Ok(true)
    }

    pub fn tags_for_file(&self, path: &Path) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.name FROM tags t
            JOIN file_tags ft ON t.id = ft.tag_id
            JOIN files f ON f.id = ft.file_id
            WHERE f.path = ?1
            ORDER BY t.name
            "#,
        )?;
        let rows = stmt.query_map(params![path_key(path)], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// path -> tags, for every given path that has at least one tag
    pub fn tags_for_files(&self, paths: &[String]) -> Result<HashMap<String, Vec<Tag>>> {
        let conn = self.connect()?;
        let mut result: HashMap<String, Vec<Tag>> = HashMap::new();
        for batch in paths.chunks(MAX_PARAMS) {
            let sql = format!(
                r#"
                SELECT f.path, t.name, t.color FROM files f
                JOIN file_tags ft ON f.id = ft.file_id
                JOIN tags t ON ft.tag_id = t.id
                WHERE f.path IN ({})
                ORDER BY t.name
                "#,
                placeholders(batch.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(batch), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    Tag {
                        name: row.get(1)?,
                        color: row.get(2)?,
                    },
                ))
            })?;
            for row in rows {
                let (path, tag) = row?;
                result.entry(path).or_default().push(tag);
            }
        }
        Ok(result)
    }

    /// Paths carrying all (`And`) or any (`Or`) of `tags`
    pub fn search_by_tags(&self, tags: &[String], logic: TagLogic) -> Result<Vec<String>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let marks = placeholders(tags.len());
        let sql = match logic {
            TagLogic::Or => format!(
                r#"
                SELECT DISTINCT f.path FROM files f
                JOIN file_tags ft ON f.id = ft.file_id
                JOIN tags t ON ft.tag_id = t.id
                WHERE t.name IN ({marks})
                ORDER BY f.path
                "#
            ),
            TagLogic::And => format!(
                r#"
                SELECT f.path FROM files f
                JOIN file_tags ft ON f.id = ft.file_id
                JOIN tags t ON ft.tag_id = t.id
                WHERE t.name IN ({marks})
                GROUP BY f.id
                HAVING COUNT(DISTINCT t.id) = {}
                ORDER BY f.path
                "#,
                distinct_count(tags)
            ),
        };

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(tags), |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ===== Maintenance =====

    pub fn stats(&self) -> Result<MetadataStats> {
        let conn = self.connect()?;
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        let last_indexed: Option<i64> =
            conn.query_row("SELECT MAX(indexed_at) FROM files", [], |row| row.get(0))?;

        Ok(MetadataStats {
            file_count: count("SELECT COUNT(*) FROM files")?,
            vector_ref_count: count("SELECT COUNT(*) FROM file_vectors")?,
            tag_count: count("SELECT COUNT(*) FROM tags")?,
            last_indexed,
        })
    }

    /// Remove every file and vector ref; tags are kept
    pub fn clear_files(&self) -> Result<()> {
        self.connect()?
            .execute_batch("DELETE FROM file_vectors; DELETE FROM file_tags; DELETE FROM files;")?;
        Ok(())
    }

    fn execute_in_batches(&self, template: &str, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut affected = 0;
        for batch in ids.chunks(MAX_PARAMS) {
            let sql = template.replace("{}", &placeholders(batch.len()));
            affected += tx.execute(&sql, params_from_iter(batch))?;
        }
        tx.commit()?;
        Ok(affected)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        extension: row.get(3)?,
        last_modified: row.get(4)?,
        indexed_at: row.get(5)?,
    })
}

fn distinct_count(tags: &[String]) -> usize {
    let mut unique: Vec<&String> = tags.iter().collect();
    unique.sort();
    unique.dedup();
    unique.len()
}

/// Modification marker stored in `files.last_modified`
pub fn mtime_nanos(time: std::time::SystemTime) -> i64 {
    match time.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    }
}
