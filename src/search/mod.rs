//! Semantic search: embeddings, vector and metadata storage, query engine

pub mod embedding;
pub mod engine;
pub mod metadata;
pub mod vectordb;

pub use embedding::{Embedder, HtpEmbedder};
pub use engine::{SearchEngine, SearchMode, SearchQuery, SearchResult};
pub use metadata::{FileRecord, MetadataStore, Tag, TagLogic};
pub use vectordb::{SqliteVectorStore, VectorStore};
