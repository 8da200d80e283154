//! Error types for semdex.

use thiserror::Error;

/// Main error type for indexing and search operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata or vector database error
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A vector's length does not match the configured dimension
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vectors and ids handed to the vector store do not pair up
    #[error("id count mismatch: {vectors} vectors, {ids} ids")]
    IdCountMismatch { vectors: usize, ids: usize },

    /// Content extraction failed
    #[error("extraction error: {0}")]
    Extract(String),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Keyword generation failed
    #[error("tagging error: {0}")]
    Tagging(String),

    /// Filesystem watcher error
    #[error("watcher error: {0}")]
    Watcher(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// A path to index lies inside an excluded path
    #[error("{} is inside excluded path {}", path.display(), exception.display())]
    Excluded {
        path: std::path::PathBuf,
        exception: std::path::PathBuf,
    },
}

impl Error {
    /// Contract errors point at a misconfigured collaborator rather than bad data.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::IdCountMismatch { .. }
        )
    }
}

/// Result type alias for semdex operations.
pub type Result<T> = std::result::Result<T, Error>;
