//! Monitored roots and excluded sub-paths.
//!
//! A path is in scope when it lies under some root and under no exception.
//! Both sets persist in `config.json`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use serde::Serialize;
use tracing::debug;

use crate::core::config::ConfigManager;
use crate::core::error::Result;
use crate::core::paths::{is_within, normalize_path};

/// Roots and exceptions, already normalized
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitoringState {
    pub roots: BTreeSet<PathBuf>,
    pub exceptions: BTreeSet<PathBuf>,
}

impl MonitoringState {
    /// Exceptions win over roots
    pub fn is_in_scope(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| is_within(path, root))
            && !self.exceptions.iter().any(|ex| is_within(path, ex))
    }

    /// The root covering `path`, if any
    pub fn root_of(&self, path: &Path) -> Option<&PathBuf> {
        self.roots.iter().find(|root| is_within(path, root))
    }

    /// The exception covering `path`, if any
    pub fn exception_of(&self, path: &Path) -> Option<&PathBuf> {
        self.exceptions.iter().find(|ex| is_within(path, ex))
    }
}

/// Thread-safe monitoring state. Mutations are written through to config.
pub struct MonitorOverlay {
    config: Arc<ConfigManager>,
    state: RwLock<MonitoringState>,
}

impl MonitorOverlay {
    pub fn load(config: Arc<ConfigManager>) -> Self {
        let stored = config.get();
        let state = MonitoringState {
            roots: stored.indexed_folders.iter().map(|p| normalize_path(p)).collect(),
            exceptions: stored.excluded_paths.iter().map(|p| normalize_path(p)).collect(),
        };
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MonitoringState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut MonitoringState) -> bool,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !f(&mut state) {
            return Ok(false);
        }
        let roots: Vec<PathBuf> = state.roots.iter().cloned().collect();
        let exceptions: Vec<PathBuf> = state.exceptions.iter().cloned().collect();
        self.config.update(|c| {
            c.indexed_folders = roots;
            c.excluded_paths = exceptions;
        })?;
        Ok(true)
    }

    pub fn is_in_scope(&self, path: &Path) -> bool {
        self.read().is_in_scope(&normalize_path(path))
    }

    pub fn is_root(&self, path: &Path) -> bool {
        self.read().roots.contains(&normalize_path(path))
    }

    pub fn is_exception(&self, path: &Path) -> bool {
        self.read().exceptions.contains(&normalize_path(path))
    }

    pub fn root_of(&self, path: &Path) -> Option<PathBuf> {
        self.read().root_of(&normalize_path(path)).cloned()
    }

    pub fn exception_of(&self, path: &Path) -> Option<PathBuf> {
        self.read().exception_of(&normalize_path(path)).cloned()
    }

    pub fn snapshot(&self) -> MonitoringState {
        self.read().clone()
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.read().roots.iter().cloned().collect()
    }

    pub fn exceptions(&self) -> Vec<PathBuf> {
        self.read().exceptions.iter().cloned().collect()
    }

    /// Returns false if already a root
    pub fn add_root(&self, path: &Path) -> Result<bool> {
        let path = normalize_path(path);
        debug!(path = %path.display(), "adding root");
        self.mutate(|s| s.roots.insert(path))
    }

    /// Remove an exact root along with any exceptions beneath it.
    /// Returns false if `path` is not a root.
    pub fn remove_root(&self, path: &Path) -> Result<bool> {
        let path = normalize_path(path);
        self.mutate(|s| {
            if !s.roots.remove(&path) {
                return false;
            }
            s.exceptions.retain(|ex| !is_within(ex, &path));
            true
        })
    }

    pub fn add_exception(&self, path: &Path) -> Result<bool> {
        let path = normalize_path(path);
        self.mutate(|s| s.exceptions.insert(path))
    }

    pub fn remove_exception(&self, path: &Path) -> Result<bool> {
        let path = normalize_path(path);
        self.mutate(|s| s.exceptions.remove(&path))
    }
}
