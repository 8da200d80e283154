//! Filesystem watch boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FsEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Callback receiving events, invoked on the backend's own thread
pub type EventSink = Arc<dyn Fn(FsEvent) + Send + Sync>;

/// Recursive per-root watching
pub trait WatchBackend: Send {
    fn add_watch(&mut self, root: &Path, sink: EventSink) -> Result<()>;

    /// Returns false if `root` was not watched
    fn remove_watch(&mut self, root: &Path) -> bool;
}

/// Accepts watches and never reports anything
#[derive(Debug, Default)]
pub struct NullWatcher;

impl WatchBackend for NullWatcher {
    fn add_watch(&mut self, _root: &Path, _sink: EventSink) -> Result<()> {
        Ok(())
    }

    fn remove_watch(&mut self, _root: &Path) -> bool {
        false
    }
}

#[cfg(feature = "watch")]
pub use notify_backend::NotifyWatcher;

#[cfg(feature = "watch")]
mod notify_backend {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use notify::event::{ModifyKind, RenameMode};
    use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
    use tracing::{debug, info, warn};

    use super::{EventSink, FsEvent, FsEventKind, WatchBackend};
    use crate::core::error::{Error, Result};

    /// One recursive `notify` watcher per root
    #[derive(Default)]
    pub struct NotifyWatcher {
        watchers: HashMap<PathBuf, RecommendedWatcher>,
    }

    impl NotifyWatcher {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl WatchBackend for NotifyWatcher {
        fn add_watch(&mut self, root: &Path, sink: EventSink) -> Result<()> {
            if self.watchers.contains_key(root) {
                debug!(root = %root.display(), "already watching");
                return Ok(());
            }

            let mut watcher =
                notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        for fs_event in convert_event(&event) {
                            sink(fs_event);
                        }
                    }
                    Err(e) => warn!("watch error: {e}"),
                })
                .map_err(|e| Error::Watcher(e.to_string()))?;

            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| Error::Watcher(e.to_string()))?;

            info!(root = %root.display(), "watching");
            self.watchers.insert(root.to_path_buf(), watcher);
            Ok(())
        }

        fn remove_watch(&mut self, root: &Path) -> bool {
            // Dropping the watcher stops it
            let removed = self.watchers.remove(root).is_some();
            if removed {
                info!(root = %root.display(), "stopped watching");
            }
            removed
        }
    }

    /// Map a notify event onto zero or more create/modify/delete events
    pub(super) fn convert_event(event: &Event) -> Vec<FsEvent> {
        let paths = &event.paths;
        let all = |kind| {
            paths
                .iter()
                .map(|p| FsEvent::new(p.clone(), kind))
                .collect::<Vec<_>>()
        };

        match &event.kind {
            EventKind::Create(_) => all(FsEventKind::Created),
            EventKind::Remove(_) => all(FsEventKind::Deleted),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::Both if paths.len() >= 2 => vec![
                    FsEvent::new(paths[0].clone(), FsEventKind::Deleted),
                    FsEvent::new(paths[1].clone(), FsEventKind::Created),
                ],
                RenameMode::From => all(FsEventKind::Deleted),
                RenameMode::To => all(FsEventKind::Created),
                // Unknown direction; intake turns a vanished path into a delete
                _ => all(FsEventKind::Modified),
            },
            EventKind::Modify(_) => all(FsEventKind::Modified),
            _ => Vec::new(),
        }
    }
}

#[cfg(all(test, feature = "watch"))]
mod tests {
    use super::notify_backend::convert_event;
    use super::*;
    use notify::event::{
        AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind, RenameMode,
    };
    use notify::{Event, EventKind};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_convert_create_modify_remove() {
        assert_eq!(
            convert_event(&event(EventKind::Create(CreateKind::File), &["/a.txt"])),
            vec![FsEvent::new("/a.txt", FsEventKind::Created)]
        );
        assert_eq!(
            convert_event(&event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/a.txt"]
            )),
            vec![FsEvent::new("/a.txt", FsEventKind::Modified)]
        );
        assert_eq!(
            convert_event(&event(EventKind::Remove(RemoveKind::File), &["/a.txt"])),
            vec![FsEvent::new("/a.txt", FsEventKind::Deleted)]
        );
    }

    #[test]
    fn test_convert_rename() {
        assert_eq!(
            convert_event(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/old.txt", "/new.txt"]
            )),
            vec![
                FsEvent::new("/old.txt", FsEventKind::Deleted),
                FsEvent::new("/new.txt", FsEventKind::Created),
            ]
        );
        assert_eq!(
            convert_event(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                &["/old.txt"]
            )),
            vec![FsEvent::new("/old.txt", FsEventKind::Deleted)]
        );
    }

    #[test]
    fn test_access_events_ignored() {
        assert!(convert_event(&event(EventKind::Access(AccessKind::Any), &["/a.txt"])).is_empty());
    }

    #[test]
    fn test_notify_watcher_reports_new_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = crate::core::paths::normalize_path(dir.path());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);

        let mut watcher = NotifyWatcher::new();
        watcher.add_watch(
            &root,
            Arc::new(move |e: FsEvent| sink_seen.lock().unwrap().push(e)),
        )?;
        std::fs::write(root.join("new.txt"), "hello")?;

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if seen.lock().unwrap().iter().any(|e| e.path.ends_with("new.txt")) {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(seen.lock().unwrap().iter().any(|e| e.path.ends_with("new.txt")));

        assert!(watcher.remove_watch(&root));
        assert!(!watcher.remove_watch(&root));
        Ok(())
    }
}
