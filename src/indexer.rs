//! Orchestrator: owns the stores, the queue, the worker thread and the
//! filesystem watchers, and exposes indexing, monitoring and search.
//!
//! Filesystem events and folder walks only enqueue tasks; a single worker
//! thread drains the queue and performs all writes.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::core::config::ConfigManager;
use crate::core::error::{Error, Result};
use crate::core::paths::{is_within, normalize_path, DataPaths};
use crate::indexing::monitor::{MonitorOverlay, MonitoringState};
use crate::indexing::queue::{IndexQueue, IndexTask, TaskKind};
use crate::indexing::scanner::{FileScanner, ScanOutcome};
use crate::indexing::watcher::{EventSink, FsEvent, FsEventKind, WatchBackend};
use crate::search::embedding::{self, Embedder};
use crate::search::engine::{SearchEngine, SearchQuery, SearchResult};
use crate::search::metadata::{mtime_nanos, MetadataStore};
use crate::search::vectordb::{SqliteVectorStore, VectorStore};
use crate::tagging::{self, AutoTagger};

/// Collaborators the orchestrator is assembled from
pub struct Components {
    pub config: Arc<ConfigManager>,
    pub embedder: Arc<dyn Embedder>,
    pub metadata: Arc<MetadataStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub tagger: AutoTagger,
    pub watcher: Box<dyn WatchBackend>,
    /// Never indexed, even when inside a root
    pub data_root: Option<PathBuf>,
}

impl Components {
    /// Build the configured collaborators inside a data directory
    pub fn open(paths: &DataPaths) -> Result<Self> {
        paths.ensure_exists()?;
        let config = Arc::new(ConfigManager::load(&paths.config));
        let settings = config.get();

        let embedder: Arc<dyn Embedder> = Arc::from(embedding::from_config(&settings.embedding)?);
        let vectors = SqliteVectorStore::open(&paths.vector_db, embedder.dimension())?;
        let metadata = MetadataStore::open(&paths.metadata_db)?;

        let tagger = match tagging::from_config(&settings.llm) {
            Ok(generator) => AutoTagger::new(generator),
            Err(e) => {
                warn!("automatic tagging disabled: {e}");
                AutoTagger::disabled()
            }
        };

        Ok(Self {
            config,
            embedder,
            metadata: Arc::new(metadata),
            vectors: Arc::new(vectors),
            tagger,
            watcher: default_watcher(),
            data_root: Some(normalize_path(&paths.root)),
        })
    }
}

#[cfg(feature = "watch")]
fn default_watcher() -> Box<dyn WatchBackend> {
    Box::new(crate::indexing::watcher::NotifyWatcher::new())
}

#[cfg(not(feature = "watch"))]
fn default_watcher() -> Box<dyn WatchBackend> {
    Box::new(crate::indexing::watcher::NullWatcher)
}

/// Result of asking to index a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    /// Registered as a new monitoring root
    RootAdded,
    /// Was excluded; the exception was lifted
    Unexcluded,
    /// Already covered by a root
    AlreadyMonitored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveOutcome {
    /// Exact root removed and its data purged
    RootRemoved { purged: usize },
    /// Sub-path of a root, now excluded; data kept
    Excluded,
    /// Not covered by any root
    NotMonitored,
}

/// A running folder walk
pub struct FolderWalk {
    pub outcome: AddOutcome,
    handle: JoinHandle<usize>,
}

impl FolderWalk {
    /// Wait for the walk; returns the number of files queued
    pub fn join(self) -> usize {
        self.handle.join().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub files: usize,
    pub vector_refs: usize,
    pub vectors: usize,
    pub tags: usize,
    /// Unix seconds
    pub last_indexed: Option<i64>,
    pub pending: usize,
    pub current: Option<IndexTask>,
}

/// State shared between the caller, the worker, walks and watch callbacks
struct Pipeline {
    queue: Arc<IndexQueue>,
    scanner: FileScanner,
    tagger: AutoTagger,
    metadata: Arc<MetadataStore>,
    monitor: Arc<MonitorOverlay>,
    data_root: Option<PathBuf>,
    active_walks: AtomicUsize,
}

impl Pipeline {
    fn is_indexable(&self, path: &Path) -> bool {
        if let Some(data_root) = &self.data_root {
            if is_within(path, data_root) {
                return false;
            }
        }
        self.monitor.is_in_scope(path)
    }

    fn handle_event(&self, event: FsEvent) {
        let path = normalize_path(&event.path);
        if !self.is_indexable(&path) {
            return;
        }

        match event.kind {
            FsEventKind::Created | FsEventKind::Modified => {
                let Ok(meta) = std::fs::metadata(&path) else {
                    // Renames of unknown direction report the old path this way
                    debug!(path = %path.display(), "event for vanished path, queueing delete");
                    self.queue.enqueue(path, TaskKind::Delete);
                    return;
                };
                if meta.is_dir() {
                    // Moved-in directories only report themselves
                    if event.kind == FsEventKind::Created {
                        self.enqueue_tree(&path, &self.monitor.snapshot());
                    }
                    return;
                }
                if self.is_current(&path, &meta) {
                    debug!(path = %path.display(), "redundant event dropped");
                    return;
                }
                self.queue.enqueue(path, TaskKind::Update);
            }
            FsEventKind::Deleted => {
                self.queue.enqueue(path, TaskKind::Delete);
            }
        }
    }

    fn is_current(&self, path: &Path, meta: &std::fs::Metadata) -> bool {
        let Ok(modified) = meta.modified() else {
            return false;
        };
        self.scanner
            .is_unchanged(path, mtime_nanos(modified))
            .unwrap_or(false)
    }

    /// Queue an update for every in-scope file under `root`
    fn enqueue_tree(&self, root: &Path, scope: &MonitoringState) -> usize {
        let mut count = 0;
        let walker = WalkDir::new(root).follow_links(false).into_iter();
        for entry in walker.filter_entry(|e| {
            scope.is_in_scope(e.path())
                && !self
                    .data_root
                    .as_deref()
                    .is_some_and(|data| is_within(e.path(), data))
        }) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), "walk error: {e}");
                    continue;
                }
            };
            if entry.file_type().is_file() && self.queue.enqueue(entry.path(), TaskKind::Update) {
                count += 1;
            }
        }
        info!(root = %root.display(), files = count, "folder queued");
        count
    }

    fn dispatch(&self, task: &IndexTask) -> Result<()> {
        match task.kind {
            TaskKind::Update => self.update(&task.path),
            TaskKind::Delete => self.delete(&task.path),
        }
    }

    fn update(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            debug!(path = %path.display(), "file gone before update, skipping");
            return Ok(());
        }
        if !self.is_indexable(path) {
            debug!(path = %path.display(), "no longer in scope, skipping");
            return Ok(());
        }

        if self.scanner.process_file(path)? == ScanOutcome::Missing {
            return Ok(());
        }

        if self.tagger.is_enabled() {
            let vocabulary = self.metadata.tag_names()?;
            for tag in self.tagger.generate_tags(path, &vocabulary) {
                self.metadata.link_file_tag(path, &tag)?;
            }
        }
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        if self.scanner.remove_file(path)? {
            return Ok(());
        }
        // A removed directory leaves only its own path behind
        if !path.exists() {
            let purged = self.scanner.purge_prefix(path)?;
            if purged > 0 {
                info!(path = %path.display(), files = purged, "removed directory from index");
            }
        }
        Ok(())
    }
}

/// Decrements the active walk count when the walk ends, even by panic
struct WalkGuard<'a>(&'a AtomicUsize);

impl Drop for WalkGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_worker(pipeline: Arc<Pipeline>, running: Arc<AtomicBool>, idle: Duration) {
    info!("indexing worker started");
    while running.load(Ordering::SeqCst) {
        let Some(task) = pipeline.queue.start_next() else {
            thread::sleep(idle);
            continue;
        };

        debug!(path = %task.path.display(), kind = %task.kind, "processing task");
        match panic::catch_unwind(AssertUnwindSafe(|| pipeline.dispatch(&task))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(path = %task.path.display(), kind = %task.kind, "task failed: {e}"),
            Err(_) => error!(path = %task.path.display(), kind = %task.kind, "task panicked"),
        }
        pipeline.queue.clear_current();
    }
    info!("indexing worker stopped");
}

pub struct SemanticIndexer {
    config: Arc<ConfigManager>,
    vectors: Arc<dyn VectorStore>,
    pipeline: Arc<Pipeline>,
    engine: SearchEngine,
    watcher: Mutex<Box<dyn WatchBackend>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    idle: Duration,
}

impl SemanticIndexer {
    /// Open the index stored in `paths` with the configured collaborators
    pub fn open(paths: &DataPaths) -> Result<Self> {
        Ok(Self::with_components(Components::open(paths)?))
    }

    pub fn with_components(components: Components) -> Self {
        let settings = components.config.get();
        let monitor = Arc::new(MonitorOverlay::load(Arc::clone(&components.config)));

        let scanner = FileScanner::new(
            Arc::clone(&components.embedder),
            Arc::clone(&components.metadata),
            Arc::clone(&components.vectors),
            &settings,
        );
        let engine = SearchEngine::new(
            components.embedder,
            Arc::clone(&components.metadata),
            Arc::clone(&components.vectors),
            Arc::clone(&monitor),
            settings.search.top_k,
        );
        let pipeline = Arc::new(Pipeline {
            queue: Arc::new(IndexQueue::new()),
            scanner,
            tagger: components.tagger,
            metadata: components.metadata,
            monitor,
            data_root: components.data_root,
            active_walks: AtomicUsize::new(0),
        });

        Self {
            config: components.config,
            vectors: components.vectors,
            pipeline,
            engine,
            watcher: Mutex::new(components.watcher),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            idle: Duration::from_millis(settings.indexing.idle_ms.max(1)),
        }
    }

    fn watcher(&self) -> MutexGuard<'_, Box<dyn WatchBackend>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> EventSink {
        let pipeline = Arc::clone(&self.pipeline);
        Arc::new(move |event| pipeline.handle_event(event))
    }

    /// Start the worker and watch every existing root
    pub fn start(&self) {
        self.start_worker();
        self.start_watching();
    }

    /// Spawn the worker thread if it is not running
    pub fn start_worker(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let pipeline = Arc::clone(&self.pipeline);
        let running = Arc::clone(&self.running);
        let idle = self.idle;
        *worker = Some(thread::spawn(move || run_worker(pipeline, running, idle)));
    }

    /// Register a watch for every persisted root that still exists
    pub fn start_watching(&self) {
        for root in self.roots() {
            if !root.is_dir() {
                warn!(root = %root.display(), "monitored folder missing, not watching");
                continue;
            }
            self.watch(&root);
        }
    }

    fn watch(&self, root: &Path) {
        if let Err(e) = self.watcher().add_watch(root, self.sink()) {
            warn!(root = %root.display(), "cannot watch folder: {e}");
        }
    }

    /// Feed a filesystem event through scope checks and the change gate
    pub fn handle_event(&self, event: FsEvent) {
        self.pipeline.handle_event(event);
    }

    /// Monitor `path` and queue every file under it.
    ///
    /// An excluded path is re-included; a path outside every root becomes a
    /// new root. A path strictly inside an excluded path is refused with
    /// [`Error::Excluded`], since exclusions outrank roots. The walk runs on
    /// its own thread.
    pub fn index_folder(&self, path: &Path) -> Result<FolderWalk> {
        let path = normalize_path(path);
        if !path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }

        let monitor = &self.pipeline.monitor;
        let outcome = if monitor.is_exception(&path) {
            monitor.remove_exception(&path)?;
            info!(path = %path.display(), "exclusion lifted");
            AddOutcome::Unexcluded
        } else if let Some(exception) = monitor.exception_of(&path) {
            return Err(Error::Excluded { path, exception });
        } else if monitor.is_in_scope(&path) {
            AddOutcome::AlreadyMonitored
        } else {
            monitor.add_root(&path)?;
            info!(path = %path.display(), "monitoring root added");
            if path.is_dir() && self.worker_running() {
                self.watch(&path);
            }
            AddOutcome::RootAdded
        };

        let pipeline = Arc::clone(&self.pipeline);
        pipeline.active_walks.fetch_add(1, Ordering::SeqCst);
        let handle = thread::spawn(move || {
            let _guard = WalkGuard(&pipeline.active_walks);
            let scope = pipeline.monitor.snapshot();
            pipeline.enqueue_tree(&path, &scope)
        });

        Ok(FolderWalk { outcome, handle })
    }

    /// Stop indexing `path`.
    ///
    /// An exact root is dropped and everything stored under it that no other
    /// root still covers is purged. A sub-path of a root becomes an exception
    /// and keeps its data.
    pub fn remove_path(&self, path: &Path) -> Result<RemoveOutcome> {
        let path = normalize_path(path);
        let monitor = &self.pipeline.monitor;

        if monitor.remove_root(&path)? {
            self.watcher().remove_watch(&path);
            let orphaned: Vec<_> = self
                .pipeline
                .metadata
                .files_under(&path)?
                .into_iter()
                .filter(|f| !monitor.is_in_scope(Path::new(&f.path)))
                .collect();
            let purged = self.pipeline.scanner.purge_files(&orphaned)?;
            info!(path = %path.display(), files = purged, "monitoring root removed");
            return Ok(RemoveOutcome::RootRemoved { purged });
        }

        if monitor.is_in_scope(&path) {
            monitor.add_exception(&path)?;
            info!(path = %path.display(), "path excluded");
            return Ok(RemoveOutcome::Excluded);
        }

        Ok(RemoveOutcome::NotMonitored)
    }

    /// Wipe both stores and walk every root again
    pub fn rebuild(&self) -> Result<Vec<FolderWalk>> {
        self.vectors.clear()?;
        self.pipeline.metadata.clear_files()?;
        info!("index cleared for rebuild");

        self.roots()
            .into_iter()
            .filter(|root| root.exists())
            .map(|root| self.index_folder(&root))
            .collect()
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        self.engine.search(query)
    }

    /// Block until no walk is running, nothing is queued and nothing is in
    /// flight. Returns false on timeout or when the worker is not running.
    pub fn wait_until_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.is_idle() {
                return true;
            }
            if !self.worker_running() {
                return false;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pipeline.active_walks.load(Ordering::SeqCst) == 0 && self.pipeline.queue.is_idle()
    }

    fn worker_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let meta = self.pipeline.metadata.stats()?;
        Ok(IndexStats {
            files: meta.file_count,
            vector_refs: meta.vector_ref_count,
            vectors: self.vectors.count()?,
            tags: meta.tag_count,
            last_indexed: meta.last_indexed,
            pending: self.pipeline.queue.pending_count(),
            current: self.pipeline.queue.peek_current(),
        })
    }

    pub fn queue(&self) -> &Arc<IndexQueue> {
        &self.pipeline.queue
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.pipeline.metadata
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }

    pub fn monitoring_state(&self) -> MonitoringState {
        self.pipeline.monitor.snapshot()
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.pipeline.monitor.roots()
    }

    pub fn exceptions(&self) -> Vec<PathBuf> {
        self.pipeline.monitor.exceptions()
    }

    pub fn is_in_scope(&self, path: &Path) -> bool {
        self.pipeline.is_indexable(&normalize_path(path))
    }

    /// Stop the worker and every watch. Queued tasks are dropped.
    pub fn stop(&self) {
        for root in self.roots() {
            self.watcher().remove_watch(&root);
        }
        self.running.store(false, Ordering::SeqCst);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("indexing worker panicked");
            }
        }
    }
}

impl Drop for SemanticIndexer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::watcher::NullWatcher;
    use crate::tagging::KeywordGenerator;

    struct FixedTags(Vec<&'static str>);

    impl KeywordGenerator for FixedTags {
        fn name(&self) -> &str {
            "fixed"
        }
        fn generate_keywords(&self, _d: &str, _v: &[String]) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|t| t.to_string()).collect())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        docs: PathBuf,
        indexer: SemanticIndexer,
    }

    fn fixture(tags: Vec<&'static str>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let base = normalize_path(dir.path());
        let docs = base.join("docs");
        std::fs::create_dir_all(&docs).unwrap();

        let mut components = Components::open(&DataPaths::from_root(base.join("data"))).unwrap();
        components.watcher = Box::new(NullWatcher);
        components.tagger = AutoTagger::new(Some(Box::new(FixedTags(tags))));
        let indexer = SemanticIndexer::with_components(components);
        indexer.start_worker();

        Fixture {
            _dir: dir,
            docs,
            indexer,
        }
    }

    impl Fixture {
        fn settle(&self) {
            assert!(self.indexer.wait_until_idle(Some(Duration::from_secs(30))));
        }
    }

    #[test]
    fn test_index_folder_and_search() -> Result<()> {
        let fx = fixture(vec!["animals"]);
        std::fs::write(fx.docs.join("pets.txt"), "dogs and cats")?;

        let walk = fx.indexer.index_folder(&fx.docs)?;
        assert_eq!(walk.outcome, AddOutcome::RootAdded);
        assert_eq!(walk.join(), 1);
        fx.settle();

        let results = fx.indexer.search(&SearchQuery::text("cats"))?;
        assert_eq!(results.len(), 1);
        assert!(results[0].path.ends_with("pets.txt"));
        assert_eq!(results[0].tags[0].name, "animals");
        Ok(())
    }

    #[test]
    fn test_subpath_removal_excludes_then_readd_unexcludes() -> Result<()> {
        let fx = fixture(vec![]);
        let sub = fx.docs.join("sub");
        std::fs::create_dir_all(&sub)?;
        std::fs::write(sub.join("a.txt"), "alpha")?;
        fx.indexer.index_folder(&fx.docs)?.join();
        fx.settle();

        assert_eq!(fx.indexer.remove_path(&sub)?, RemoveOutcome::Excluded);
        assert!(!fx.indexer.is_in_scope(&sub.join("a.txt")));
        // Data kept, hits filtered
        assert_eq!(fx.indexer.stats()?.files, 1);
        assert!(fx.indexer.search(&SearchQuery::text("alpha"))?.is_empty());

        let walk = fx.indexer.index_folder(&sub)?;
        assert_eq!(walk.outcome, AddOutcome::Unexcluded);
        walk.join();
        fx.settle();
        assert_eq!(fx.indexer.search(&SearchQuery::text("alpha"))?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_remove_root_purges() -> Result<()> {
        let fx = fixture(vec![]);
        std::fs::write(fx.docs.join("a.txt"), "alpha")?;
        fx.indexer.index_folder(&fx.docs)?.join();
        fx.settle();
        assert_eq!(fx.indexer.stats()?.vectors, 1);

        assert_eq!(
            fx.indexer.remove_path(&fx.docs)?,
            RemoveOutcome::RootRemoved { purged: 1 }
        );
        let stats = fx.indexer.stats()?;
        assert_eq!((stats.files, stats.vectors, stats.vector_refs), (0, 0, 0));
        assert!(fx.indexer.roots().is_empty());
        assert_eq!(
            fx.indexer.remove_path(&fx.docs)?,
            RemoveOutcome::NotMonitored
        );
        Ok(())
    }

    #[test]
    fn test_events_go_through_scope_and_change_gate() -> Result<()> {
        let fx = fixture(vec![]);
        let file = fx.docs.join("a.txt");
        std::fs::write(&file, "alpha")?;
        fx.indexer.index_folder(&fx.docs)?.join();
        fx.settle();

        // Unchanged file: dropped at intake
        fx.indexer.handle_event(FsEvent::new(&file, FsEventKind::Modified));
        assert_eq!(fx.indexer.queue().pending_count(), 0);

        // Outside every root: ignored
        let outside = fx.docs.parent().unwrap().join("outside.txt");
        std::fs::write(&outside, "x")?;
        fx.indexer.handle_event(FsEvent::new(&outside, FsEventKind::Created));
        assert_eq!(fx.indexer.queue().pending_count(), 0);

        std::fs::remove_file(&file)?;
        fx.indexer.handle_event(FsEvent::new(&file, FsEventKind::Deleted));
        fx.settle();
        assert_eq!(fx.indexer.stats()?.files, 0);
        Ok(())
    }

    #[test]
    fn test_rename_reported_as_modify_drops_old_path() -> Result<()> {
        let fx = fixture(vec![]);
        let old = fx.docs.join("old.txt");
        let new = fx.docs.join("new.txt");
        std::fs::write(&old, "alpha")?;
        fx.indexer.index_folder(&fx.docs)?.join();
        fx.settle();

        std::fs::rename(&old, &new)?;
        fx.indexer.handle_event(FsEvent::new(&old, FsEventKind::Modified));
        fx.indexer.handle_event(FsEvent::new(&new, FsEventKind::Modified));
        fx.settle();

        let paths: Vec<String> = fx
            .indexer
            .metadata()
            .all_files()?
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(paths, vec![new.to_string_lossy().into_owned()]);
        let stats = fx.indexer.stats()?;
        assert_eq!((stats.vectors, stats.vector_refs), (1, 1));
        Ok(())
    }

    #[test]
    fn test_folder_inside_exclusion_is_refused() -> Result<()> {
        let fx = fixture(vec![]);
        let private = fx.docs.join("private");
        let inner = private.join("inner");
        std::fs::create_dir_all(&inner)?;
        std::fs::write(inner.join("a.txt"), "alpha")?;
        fx.indexer.index_folder(&fx.docs)?.join();
        fx.settle();
        assert_eq!(fx.indexer.remove_path(&private)?, RemoveOutcome::Excluded);

        match fx.indexer.index_folder(&inner) {
            Err(Error::Excluded { path, exception }) => {
                assert_eq!(path, inner);
                assert_eq!(exception, private);
            }
            other => panic!("expected exclusion error, got {:?}", other.map(|w| w.outcome)),
        }
        assert_eq!(fx.indexer.roots(), vec![fx.docs.clone()]);

        // Lifting the exclusion itself still works
        let walk = fx.indexer.index_folder(&private)?;
        assert_eq!(walk.outcome, AddOutcome::Unexcluded);
        assert_eq!(walk.join(), 1);
        Ok(())
    }

    #[test]
    fn test_deleted_directory_purges_contents() -> Result<()> {
        let fx = fixture(vec![]);
        let sub = fx.docs.join("sub");
        std::fs::create_dir_all(&sub)?;
        std::fs::write(sub.join("a.txt"), "alpha")?;
        std::fs::write(fx.docs.join("b.txt"), "beta")?;
        fx.indexer.index_folder(&fx.docs)?.join();
        fx.settle();

        std::fs::remove_dir_all(&sub)?;
        fx.indexer.handle_event(FsEvent::new(&sub, FsEventKind::Deleted));
        fx.settle();
        assert_eq!(fx.indexer.stats()?.files, 1);
        Ok(())
    }

    #[test]
    fn test_rebuild_reindexes_roots() -> Result<()> {
        let fx = fixture(vec![]);
        std::fs::write(fx.docs.join("a.txt"), "alpha")?;
        fx.indexer.index_folder(&fx.docs)?.join();
        fx.settle();

        for walk in fx.indexer.rebuild()? {
            assert_eq!(walk.outcome, AddOutcome::AlreadyMonitored);
            walk.join();
        }
        fx.settle();
        let stats = fx.indexer.stats()?;
        assert_eq!((stats.files, stats.vectors), (1, 1));
        Ok(())
    }

    #[test]
    fn test_missing_folder_is_rejected() {
        let fx = fixture(vec![]);
        assert!(fx.indexer.index_folder(&fx.docs.join("nope")).is_err());
        assert!(fx.indexer.roots().is_empty());
    }

    #[test]
    fn test_wait_without_worker_returns_false() -> Result<()> {
        let fx = fixture(vec![]);
        fx.indexer.stop();
        std::fs::write(fx.docs.join("a.txt"), "alpha")?;
        fx.indexer.index_folder(&fx.docs)?.join();
        assert!(!fx.indexer.wait_until_idle(Some(Duration::from_millis(50))));
        Ok(())
    }
}
