use std::path::{Component, Path, PathBuf};

/// Environment variable overriding the default data directory
pub const DATA_DIR_ENV: &str = "SEMDEX_DATA_DIR";

/// Files kept inside the data directory
pub struct DataPaths {
    pub root: PathBuf,
    pub config: PathBuf,
    pub metadata_db: PathBuf,
    pub vector_db: PathBuf,
}

impl DataPaths {
    pub fn new() -> Self {
        let root = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        Self::from_root(root)
    }

    pub fn from_root(root: PathBuf) -> Self {
        Self {
            config: root.join("config.json"),
            metadata_db: root.join("metadata.db"),
            vector_db: root.join("vectors.db"),
            root,
        }
    }

    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a path for comparison and storage.
///
/// The longest existing ancestor is canonicalized (symlinks and case resolved
/// by the OS) and the remaining components are appended lexically, so paths
/// of files that no longer exist still normalize consistently with their
/// siblings.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let lexical = lexical_normalize(&absolute);

    let mut existing = lexical.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = strip_verbatim(canonical);
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(windows)]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    let text = path.to_string_lossy();
    match text.strip_prefix(r"\\?\") {
        Some(rest) if !rest.starts_with("UNC") => PathBuf::from(rest),
        _ => path,
    }
}

#[cfg(not(windows))]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    path
}

/// True if `path` equals `ancestor` or lies beneath it (component-wise).
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

/// Lowercased extension without the leading dot
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Path as stored in the metadata database
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
