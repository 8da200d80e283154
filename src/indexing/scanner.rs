//! Per-file scan: change gate, extraction, embedding and vector replacement.
//!
//! The metadata store and the vector store are kept in step: vector ids are
//! allocated in metadata first, and a failed vector insert releases them again.
//! A record only carries the file's real modification time once its vectors
//! are stored, so an interrupted scan is retried by the next event or walk.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::chunker::TextChunker;
use super::extract::{extract_text, FileCategory};
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::paths::normalize_path;
use crate::search::embedding::Embedder;
use crate::search::metadata::{mtime_nanos, FileRecord, MetadataStore};
use crate::search::vectordb::VectorStore;

/// Modification time held by a record whose scan has not completed.
/// Matches no real file, so the change gate never skips it.
pub const UNSCANNED_MTIME: i64 = i64::MIN;

/// What `process_file` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Path is gone or not a regular file
    Missing,
    /// Stored modification time matches; nothing was touched
    Unchanged,
    /// Content embedded and stored
    Indexed { vectors: usize },
    /// Record refreshed without vectors (unsupported, empty, oversized or unembeddable)
    MetadataOnly,
}

pub struct FileScanner {
    embedder: Arc<dyn Embedder>,
    metadata: Arc<MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    chunker: TextChunker,
    batch_size: usize,
    max_file_size: u64,
}

impl FileScanner {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        metadata: Arc<MetadataStore>,
        vectors: Arc<dyn VectorStore>,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            metadata,
            vectors,
            chunker: TextChunker::from_config(&config.chunking),
            batch_size: config.chunking.batch_size.max(1),
            max_file_size: config.indexing.max_file_size,
        }
    }

    /// Index `path` unless its stored modification time is current.
    ///
    /// Extraction and encoding failures only reduce the number of vectors
    /// produced. Storage failures and contract violations are returned.
    pub fn process_file(&self, path: &Path) -> Result<ScanOutcome> {
        let path = normalize_path(path);
        let meta = match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(ScanOutcome::Missing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file vanished before scan");
                return Ok(ScanOutcome::Missing);
            }
            Err(e) => return Err(e.into()),
        };
        let mtime = mtime_nanos(meta.modified()?);

        if self.is_unchanged(&path, mtime)? {
            debug!(path = %path.display(), "unchanged, skipping");
            return Ok(ScanOutcome::Unchanged);
        }

        let embeddings = if meta.len() > self.max_file_size {
            info!(
                path = %path.display(),
                size = meta.len(),
                "file exceeds size limit, indexing metadata only"
            );
            Vec::new()
        } else {
            self.embed(&path)?
        };

        let file_id = self.metadata.upsert_file(&path, UNSCANNED_MTIME)?;

        // Full replace: stale vectors go even when nothing new was produced
        let stale = self.metadata.vector_ids_for_file(file_id)?;
        if !stale.is_empty() {
            self.vectors.delete_by_ids(&stale)?;
            self.metadata.delete_vector_ids(&stale)?;
            debug!(path = %path.display(), count = stale.len(), "purged stale vectors");
        }

        if embeddings.is_empty() {
            self.metadata.set_last_modified(file_id, mtime)?;
            info!(path = %path.display(), "indexed (metadata only)");
            return Ok(ScanOutcome::MetadataOnly);
        }

        let ids = self.metadata.allocate_vector_ids(file_id, embeddings.len())?;
        if let Err(e) = self.vectors.add(&embeddings, &ids) {
            self.metadata.delete_vector_ids(&ids)?;
            return Err(e);
        }
        self.metadata.set_last_modified(file_id, mtime)?;

        info!(path = %path.display(), vectors = ids.len(), "indexed");
        Ok(ScanOutcome::Indexed { vectors: ids.len() })
    }

    /// Whether the stored record for `path` carries modification time `mtime`
    pub fn is_unchanged(&self, path: &Path, mtime: i64) -> Result<bool> {
        Ok(self
            .metadata
            .get_file(path)?
            .is_some_and(|record| record.last_modified == mtime))
    }

    /// Delete a file's vectors, vector refs and record. Returns whether a
    /// record existed.
    pub fn remove_file(&self, path: &Path) -> Result<bool> {
        let path = normalize_path(path);
        let Some(file_id) = self.metadata.file_id(&path)? else {
            debug!(path = %path.display(), "delete for unknown file");
            return Ok(false);
        };

        let ids = self.metadata.vector_ids_for_file(file_id)?;
        self.vectors.delete_by_ids(&ids)?;
        self.metadata.delete_vector_ids(&ids)?;
        self.metadata.delete_file(&path)?;

        info!(path = %path.display(), vectors = ids.len(), "removed from index");
        Ok(true)
    }

    /// Remove every file equal to or beneath `prefix`. Vectors are deleted
    /// before the metadata rows they are resolved through.
    pub fn purge_prefix(&self, prefix: &Path) -> Result<usize> {
        let files = self.metadata.files_under(&normalize_path(prefix))?;
        self.purge_files(&files)
    }

    /// Remove the given records together with their vectors
    pub fn purge_files(&self, files: &[FileRecord]) -> Result<usize> {
        if files.is_empty() {
            return Ok(0);
        }

        let file_ids: Vec<i64> = files.iter().map(|f| f.id).collect();
        let vector_ids = self.metadata.vector_ids_for_files(&file_ids)?;
        self.vectors.delete_by_ids(&vector_ids)?;
        self.metadata.delete_vector_ids(&vector_ids)?;
        self.metadata.delete_files(&file_ids)?;

        info!(
            files = files.len(),
            vectors = vector_ids.len(),
            "purged index data"
        );
        Ok(files.len())
    }

    fn embed(&self, path: &Path) -> Result<Vec<Vec<f32>>> {
        match FileCategory::of(path) {
            FileCategory::Text | FileCategory::Document => self.embed_text(path),
            FileCategory::Image => match self.embedder.encode_image(path) {
                Ok(vector) => Ok(vec![vector]),
                Err(e) if e.is_contract_violation() => Err(e),
                Err(e) => {
                    warn!(path = %path.display(), "image encoding failed: {e}");
                    Ok(Vec::new())
                }
            },
            FileCategory::Unsupported => Ok(Vec::new()),
        }
    }

    fn embed_text(&self, path: &Path) -> Result<Vec<Vec<f32>>> {
        let text = extract_text(path);
        let chunks = self.chunker.split_text(&text);
        let mut embeddings = Vec::with_capacity(chunks.len());

        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            match self.embedder.encode_text(batch) {
                Ok(vectors) => embeddings.extend(vectors),
                Err(e) if e.is_contract_violation() => return Err(e),
                Err(e) => warn!(
                    path = %path.display(),
                    batch = i,
                    "chunk encoding failed: {e}"
                ),
            }
        }

        debug!(
            path = %path.display(),
            chunks = chunks.len(),
            embedded = embeddings.len(),
            "text encoded"
        );
        Ok(embeddings)
    }
}
