//! Deduplicating priority queue of per-path indexing tasks.
//!
//! Deletes are served before updates, and within a kind the earliest
//! enqueue wins. At most one task per path is live: a newer task for the same
//! path supersedes the older one, which stays in the heap and is discarded
//! when it surfaces at dequeue time (lazy invalidation).

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// What the worker should do with a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Update,
    Delete,
}

impl TaskKind {
    /// Lower is served first
    pub fn priority(self) -> u8 {
        match self {
            Self::Delete => 0,
            Self::Update => 10,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexTask {
    /// Unique per enqueue; identifies the live task for a path
    pub id: u64,
    pub path: PathBuf,
    pub kind: TaskKind,
    pub priority: u8,
    pub enqueued_at: DateTime<Utc>,
}

/// Heap entry: only the ordering key and the task id
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeapKey {
    priority: u8,
    enqueued_at: DateTime<Utc>,
    id: u64,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.enqueued_at, self.id).cmp(&(
            other.priority,
            other.enqueued_at,
            other.id,
        ))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<HeapKey>>,
    /// Every task still referenced by the heap, live or stale
    tasks: HashMap<u64, IndexTask>,
    /// path -> id of the live task
    latest: HashMap<PathBuf, u64>,
    current: Option<IndexTask>,
    next_id: u64,
}

impl QueueState {
    fn latest_task(&self, path: &Path) -> Option<&IndexTask> {
        self.latest.get(path).and_then(|id| self.tasks.get(id))
    }

    fn push(&mut self, path: PathBuf, kind: TaskKind) -> IndexTask {
        self.next_id += 1;
        let task = IndexTask {
            id: self.next_id,
            path,
            kind,
            priority: kind.priority(),
            enqueued_at: Utc::now(),
        };
        self.heap.push(Reverse(HeapKey {
            priority: task.priority,
            enqueued_at: task.enqueued_at,
            id: task.id,
        }));
        self.latest.insert(task.path.clone(), task.id);
        self.tasks.insert(task.id, task.clone());
        task
    }

    fn pop_live(&mut self) -> Option<IndexTask> {
        while let Some(Reverse(key)) = self.heap.pop() {
            let Some(task) = self.tasks.remove(&key.id) else {
                continue;
            };
            if self.latest.get(&task.path) == Some(&task.id) {
                self.latest.remove(&task.path);
                return Some(task);
            }
            debug!(path = %task.path.display(), kind = %task.kind, "discarding stale task");
        }
        None
    }
}

/// Thread-safe indexing queue. All operations take one lock for their duration.
#[derive(Default)]
pub struct IndexQueue {
    state: Mutex<QueueState>,
}

impl IndexQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `kind` for `path`, superseding any pending task for the same path.
    ///
    /// An update arriving while a delete is pending is only accepted if the
    /// path exists on disk again (recreation); otherwise it is dropped.
    /// Returns whether the task was queued.
    pub fn enqueue(&self, path: impl Into<PathBuf>, kind: TaskKind) -> bool {
        let path = path.into();
        // Stat outside the lock
        let exists = kind == TaskKind::Update && path.exists();

        let mut state = self.lock();
        if let Some(existing) = state.latest_task(&path) {
            if existing.kind == TaskKind::Delete && kind == TaskKind::Update && !exists {
                debug!(path = %path.display(), "dropping update for deleted path");
                return false;
            }
        }

        let task = state.push(path, kind);
        debug!(
            path = %task.path.display(),
            kind = %task.kind,
            pending = state.latest.len(),
            "task queued"
        );
        true
    }

    /// Next live task, or `None` if nothing is pending. Never blocks.
    pub fn dequeue(&self) -> Option<IndexTask> {
        self.lock().pop_live()
    }

    /// Dequeue and mark as current under a single lock, so observers never see
    /// a task that is neither pending nor current.
    pub fn start_next(&self) -> Option<IndexTask> {
        let mut state = self.lock();
        let task = state.pop_live()?;
        state.current = Some(task.clone());
        Some(task)
    }

    pub fn peek_current(&self) -> Option<IndexTask> {
        self.lock().current.clone()
    }

    pub fn set_current(&self, task: IndexTask) {
        self.lock().current = Some(task);
    }

    pub fn clear_current(&self) {
        self.lock().current = None;
    }

    /// Number of live pending tasks (stale heap entries excluded)
    pub fn pending_count(&self) -> usize {
        self.lock().latest.len()
    }

    /// Live pending tasks in service order
    pub fn list_pending(&self) -> Vec<IndexTask> {
        let state = self.lock();
        let mut pending: Vec<IndexTask> = state
            .latest
            .values()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect();
        pending.sort_by(|a, b| {
            (a.priority, a.enqueued_at, a.id).cmp(&(b.priority, b.enqueued_at, b.id))
        });
        pending
    }

    /// Nothing pending and nothing in flight
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.latest.is_empty() && state.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn drain(queue: &IndexQueue) -> Vec<(PathBuf, TaskKind)> {
        std::iter::from_fn(|| queue.dequeue())
            .map(|t| (t.path, t.kind))
            .collect()
    }

    #[test]
    fn test_delete_served_before_update() {
        let queue = IndexQueue::new();
        queue.enqueue("x", TaskKind::Update);
        queue.enqueue("y", TaskKind::Delete);

        assert_eq!(
            drain(&queue),
            vec![
                (PathBuf::from("y"), TaskKind::Delete),
                (PathBuf::from("x"), TaskKind::Update)
            ]
        );
    }

    #[test]
    fn test_fifo_within_kind() {
        let queue = IndexQueue::new();
        for name in ["a", "b", "c"] {
            queue.enqueue(name, TaskKind::Update);
        }
        let order: Vec<PathBuf> = drain(&queue).into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec![PathBuf::from("a"), "b".into(), "c".into()]);
    }

    #[test]
    fn test_update_then_update_yields_one() {
        let queue = IndexQueue::new();
        queue.enqueue("a", TaskKind::Update);
        queue.enqueue("a", TaskKind::Update);

        assert_eq!(queue.pending_count(), 1);
        assert_eq!(drain(&queue), vec![(PathBuf::from("a"), TaskKind::Update)]);
    }

    #[test]
    fn test_update_then_delete_yields_delete() {
        let queue = IndexQueue::new();
        queue.enqueue("a", TaskKind::Update);
        queue.enqueue("a", TaskKind::Delete);

        assert_eq!(drain(&queue), vec![(PathBuf::from("a"), TaskKind::Delete)]);
    }

    #[test]
    fn test_delete_then_delete_yields_one() {
        let queue = IndexQueue::new();
        queue.enqueue("a", TaskKind::Delete);
        queue.enqueue("a", TaskKind::Delete);

        assert_eq!(drain(&queue), vec![(PathBuf::from("a"), TaskKind::Delete)]);
    }

    #[test]
    fn test_delete_then_update_for_missing_path_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("a");
        let queue = IndexQueue::new();

        assert!(queue.enqueue(&missing, TaskKind::Delete));
        assert!(!queue.enqueue(&missing, TaskKind::Update));

        assert_eq!(drain(&queue), vec![(missing, TaskKind::Delete)]);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_delete_then_update_for_recreated_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        let queue = IndexQueue::new();

        queue.enqueue(&path, TaskKind::Delete);
        std::fs::write(&path, "back again").unwrap();
        assert!(queue.enqueue(&path, TaskKind::Update));

        assert_eq!(drain(&queue), vec![(path, TaskKind::Update)]);
    }

    #[test]
    fn test_current_task_tracking() {
        let queue = IndexQueue::new();
        queue.enqueue("a", TaskKind::Update);
        assert!(!queue.is_idle());

        let task = queue.start_next().unwrap();
        assert_eq!(queue.peek_current(), Some(task));
        assert_eq!(queue.pending_count(), 0);
        assert!(!queue.is_idle());

        queue.clear_current();
        assert!(queue.peek_current().is_none());
        assert!(queue.is_idle());
    }

    #[test]
    fn test_list_pending_in_service_order() {
        let queue = IndexQueue::new();
        queue.enqueue("u1", TaskKind::Update);
        queue.enqueue("u2", TaskKind::Update);
        queue.enqueue("d1", TaskKind::Delete);
        // Re-queued u1 now lines up behind u2
        queue.enqueue("u1", TaskKind::Update);

        let pending: Vec<PathBuf> = queue.list_pending().into_iter().map(|t| t.path).collect();
        assert_eq!(pending, vec![PathBuf::from("d1"), "u2".into(), "u1".into()]);
    }

    #[test]
    fn test_stale_entries_are_released() {
        let queue = IndexQueue::new();
        for _ in 0..5 {
            queue.enqueue("a", TaskKind::Update);
        }
        assert!(queue.dequeue().is_some());
        assert!(queue.dequeue().is_none());
        assert!(queue.lock().tasks.is_empty());
        assert!(queue.lock().heap.is_empty());
    }

    #[test]
    fn test_concurrent_enqueue() {
        let queue = Arc::new(IndexQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        queue.enqueue(format!("f{}", i % 10), TaskKind::Update);
                        if t == 0 && i % 7 == 0 {
                            queue.enqueue(format!("f{}", i % 10), TaskKind::Delete);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let drained = drain(&queue);
        assert_eq!(drained.len(), 10);
        let mut paths: Vec<_> = drained.into_iter().map(|(p, _)| p).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 10);
    }
}
