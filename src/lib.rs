//! semdex library
//!
//! Local semantic file search: watches folders, embeds their contents and
//! answers combined vector / tag / extension queries.
//!
//! # Modules
//!
//! - `core`: configuration, data paths, errors
//! - `indexing`: chunking, extraction, task queue, scanner, monitored paths, watching
//! - `search`: embeddings, vector and metadata stores, query engine
//! - `tagging`: LLM-backed automatic tags
//! - `indexer`: the orchestrator tying it all together

pub mod core;
pub mod indexer;
pub mod indexing;
pub mod search;
pub mod tagging;

// Re-exports for convenience
pub use core::config::{Config, ConfigManager, LlmConfig, LlmProvider};
pub use core::error::{Error, Result};
pub use core::paths::DataPaths;
pub use indexer::{AddOutcome, Components, FolderWalk, IndexStats, RemoveOutcome, SemanticIndexer};
pub use indexing::{FsEvent, FsEventKind, IndexQueue, IndexTask, TaskKind};
pub use search::{SearchMode, SearchQuery, SearchResult, Tag, TagLogic};
