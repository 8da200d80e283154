//! Indexing pipeline: extraction, chunking, the task queue, the per-file
//! scanner, monitored-path scoping and filesystem watching.

pub mod chunker;
pub mod extract;
pub mod monitor;
pub mod queue;
pub mod scanner;
pub mod watcher;

pub use chunker::TextChunker;
pub use monitor::{MonitorOverlay, MonitoringState};
pub use queue::{IndexQueue, IndexTask, TaskKind};
pub use scanner::{FileScanner, ScanOutcome};
pub use watcher::{EventSink, FsEvent, FsEventKind, NullWatcher, WatchBackend};
