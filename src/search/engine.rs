//! Search Engine - combines the embedder, vector store and metadata store
//!
//! Vector hits are resolved to file paths and filtered by existence, scope,
//! extension, mode and tags. Similarity order from the vector store is kept.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::embedding::Embedder;
use super::metadata::{MetadataStore, Tag, TagLogic};
use super::vectordb::VectorStore;
use crate::core::error::Result;
use crate::core::paths::extension_of;
use crate::indexing::extract::IMAGE_EXTENSIONS;
use crate::indexing::monitor::MonitorOverlay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Text and images
    #[default]
    Unified,
    /// Everything except images
    Text,
    Image,
    /// Tag lookup only, no vectors
    Tag,
}

impl SearchMode {
    fn accepts_extension(self, ext: &str) -> bool {
        let image = IMAGE_EXTENSIONS.contains(&ext);
        match self {
            Self::Image => image,
            Self::Text => !image,
            Self::Unified | Self::Tag => true,
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unified" | "all" => Ok(Self::Unified),
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "tag" | "tags" => Ok(Self::Tag),
            other => Err(format!(
                "unknown search mode '{other}' (expected unified, text, image or tag)"
            )),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unified => "unified",
            Self::Text => "text",
            Self::Image => "image",
            Self::Tag => "tag",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub mode: SearchMode,
    /// Allowed extensions, empty for any. Case and leading dots are ignored.
    pub extensions: Vec<String>,
    pub tags: Vec<String>,
    pub tag_logic: TagLogic,
    /// Cap on returned results after filtering
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    fn allowed_extensions(&self) -> HashSet<String> {
        self.extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

/// Search result with file path, similarity score and current tags.
///
/// Tag-only results (no query text, or tag mode) come straight from the
/// metadata store: they are not checked against the disk or the monitored
/// scope, so a deleted or excluded file that still has a record and tags is
/// listed until its record is removed.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub path: String,
    /// Cosine similarity; 0 for tag-only results
    pub score: f32,
    pub tags: Vec<Tag>,
}

pub struct SearchEngine {
    embedder: Arc<dyn Embedder>,
    metadata: Arc<MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    monitor: Arc<MonitorOverlay>,
    top_k: usize,
}

impl SearchEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        metadata: Arc<MetadataStore>,
        vectors: Arc<dyn VectorStore>,
        monitor: Arc<MonitorOverlay>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            metadata,
            vectors,
            monitor,
            top_k: top_k.max(1),
        }
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let text = query.text.trim();
        let extensions = query.allowed_extensions();

        let mut hits = if query.mode == SearchMode::Tag {
            // Bare text in tag mode names a single tag
            let tags = if query.tags.is_empty() && !text.is_empty() {
                vec![text.to_string()]
            } else {
                query.tags.clone()
            };
            self.tag_only(&tags, query.tag_logic, &extensions)?
        } else if text.is_empty() {
            self.tag_only(&query.tags, query.tag_logic, &extensions)?
        } else {
            self.vector_search(text, query, &extensions)?
        };

        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        self.annotate(hits)
    }

    fn tag_only(
        &self,
        tags: &[String],
        logic: TagLogic,
        extensions: &HashSet<String>,
    ) -> Result<Vec<(String, f32)>> {
        Ok(self
            .metadata
            .search_by_tags(tags, logic)?
            .into_iter()
            .filter(|path| extensions.is_empty() || extensions.contains(&extension_of(Path::new(path))))
            .map(|path| (path, 0.0))
            .collect())
    }

    fn vector_search(
        &self,
        text: &str,
        query: &SearchQuery,
        extensions: &HashSet<String>,
    ) -> Result<Vec<(String, f32)>> {
        let query_vec = self.embedder.encode_query(text)?;
        let nearest = self.vectors.search(&query_vec, self.top_k)?;
        let ids: Vec<i64> = nearest.iter().map(|(id, _)| *id).collect();
        let owners = self.metadata.paths_for_vector_ids(&ids)?;

        let tagged: Option<HashSet<String>> = if query.tags.is_empty() {
            None
        } else {
            Some(
                self.metadata
                    .search_by_tags(&query.tags, query.tag_logic)?
                    .into_iter()
                    .collect(),
            )
        };

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        for (id, score) in nearest {
            let Some(path) = owners.get(&id) else {
                debug!(vector_id = id, "vector without owner");
                continue;
            };
            if seen.contains(path) {
                continue;
            }
            let fs_path = Path::new(path);
            if !fs_path.exists() {
                debug!(path = %path, "hit no longer on disk");
                continue;
            }
            if !self.monitor.is_in_scope(fs_path) {
                continue;
            }
            let ext = extension_of(fs_path);
            if !extensions.is_empty() && !extensions.contains(&ext) {
                continue;
            }
            if !query.mode.accepts_extension(&ext) {
                continue;
            }
            if tagged.as_ref().is_some_and(|t| !t.contains(path)) {
                continue;
            }
            seen.insert(path.clone());
            hits.push((path.clone(), score));
        }

        debug!(query = text, candidates = ids.len(), results = hits.len(), "vector search");
        Ok(hits)
    }

    fn annotate(&self, hits: Vec<(String, f32)>) -> Result<Vec<SearchResult>> {
        let paths: Vec<String> = hits.iter().map(|(p, _)| p.clone()).collect();
        let mut tags = self.metadata.tags_for_files(&paths)?;
        Ok(hits
            .into_iter()
            .map(|(path, score)| SearchResult {
                tags: tags.remove(&path).unwrap_or_default(),
                path,
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Config, ConfigManager};
    use crate::core::paths::normalize_path;
    use crate::indexing::scanner::FileScanner;
    use crate::search::embedding::HtpEmbedder;
    use crate::search::vectordb::SqliteVectorStore;
    use std::path::PathBuf;

    struct Fixture {
        _dir: tempfile::TempDir,
        docs: PathBuf,
        metadata: Arc<MetadataStore>,
        monitor: Arc<MonitorOverlay>,
        scanner: FileScanner,
        engine: SearchEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = normalize_path(dir.path());
        let docs = root.join("docs");
        std::fs::create_dir_all(&docs).unwrap();

        let embedder: Arc<dyn Embedder> = Arc::new(HtpEmbedder::new());
        let metadata = Arc::new(MetadataStore::open(&root.join("metadata.db")).unwrap());
        let vectors: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::open(&root.join("vectors.db"), 384).unwrap());
        let config = Arc::new(ConfigManager::load(&root.join("config.json")));
        let monitor = Arc::new(MonitorOverlay::load(config));
        monitor.add_root(&docs).unwrap();

        let scanner = FileScanner::new(
            Arc::clone(&embedder),
            Arc::clone(&metadata),
            Arc::clone(&vectors),
            &Config::default(),
        );
        let engine = SearchEngine::new(
            embedder,
            Arc::clone(&metadata),
            vectors,
            Arc::clone(&monitor),
            50,
        );
        Fixture {
            _dir: dir,
            docs,
            metadata,
            monitor,
            scanner,
            engine,
        }
    }

    impl Fixture {
        fn index(&self, name: &str, content: &str) -> PathBuf {
            let path = self.docs.join(name);
            std::fs::write(&path, content).unwrap();
            self.scanner.process_file(&path).unwrap();
            path
        }

        fn paths(&self, query: &SearchQuery) -> Vec<String> {
            self.engine
                .search(query)
                .unwrap()
                .into_iter()
                .map(|r| r.path)
                .collect()
        }
    }

    fn key(path: &Path) -> String {
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Image".parse::<SearchMode>(), Ok(SearchMode::Image));
        assert_eq!("tag".parse::<SearchMode>(), Ok(SearchMode::Tag));
        assert!("fuzzy".parse::<SearchMode>().is_err());
        assert_eq!(SearchMode::Unified.to_string(), "unified");
    }

    #[test]
    fn test_results_are_deduplicated_and_tagged() -> Result<()> {
        let fx = fixture();
        let long = fx.index("long.txt", &"cats purr softly. ".repeat(300));
        fx.metadata.link_file_tag(&long, "pets")?;

        let results = fx.engine.search(&SearchQuery::text("cats"))?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, key(&long));
        assert_eq!(results[0].tags[0].name, "pets");
        assert!(results[0].score > 0.0);
        Ok(())
    }

    #[test]
    fn test_vanished_and_out_of_scope_hits_are_dropped() -> Result<()> {
        let fx = fixture();
        let gone = fx.index("gone.txt", "cats");
        let hidden = fx.index("private.txt", "cats");
        let kept = fx.index("kept.txt", "cats");

        std::fs::remove_file(&gone)?;
        fx.monitor.add_exception(&hidden)?;

        assert_eq!(fx.paths(&SearchQuery::text("cats")), vec![key(&kept)]);
        Ok(())
    }

    #[test]
    fn test_extension_and_mode_filters() -> Result<()> {
        let fx = fixture();
        let txt = fx.index("cats.txt", "cats");
        let md = fx.index("cats.md", "cats");
        let png = fx.docs.join("cat.png");
        image::RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3])).save(&png).unwrap();
        fx.scanner.process_file(&png)?;

        let mut query = SearchQuery::text("cats");
        query.extensions = vec![".MD".to_string()];
        assert_eq!(fx.paths(&query), vec![key(&md)]);

        let mut query = SearchQuery::text("cats");
        query.mode = SearchMode::Image;
        assert_eq!(fx.paths(&query), vec![key(&png)]);

        let mut query = SearchQuery::text("cats");
        query.mode = SearchMode::Text;
        let mut text_hits = fx.paths(&query);
        text_hits.sort();
        let mut expected = vec![key(&md), key(&txt)];
        expected.sort();
        assert_eq!(text_hits, expected);
        Ok(())
    }

    #[test]
    fn test_tag_only_results_skip_disk_and_scope_checks() -> Result<()> {
        let fx = fixture();
        let gone = fx.index("gone.txt", "cats");
        let hidden = fx.index("hidden.txt", "cats");
        fx.metadata.link_file_tag(&gone, "pets")?;
        fx.metadata.link_file_tag(&hidden, "pets")?;
        std::fs::remove_file(&gone)?;
        fx.monitor.add_exception(&hidden)?;

        let query = SearchQuery {
            tags: vec!["pets".to_string()],
            ..Default::default()
        };
        let mut paths = fx.paths(&query);
        paths.sort();
        assert_eq!(paths, vec![key(&gone), key(&hidden)]);
        assert!(fx.engine.search(&query)?.iter().all(|r| r.score == 0.0));

        // The vector path filters both
        let mut query = SearchQuery::text("cats");
        query.tags = vec!["pets".to_string()];
        assert!(fx.paths(&query).is_empty());
        Ok(())
    }

    #[test]
    fn test_tag_filter_with_query_text() -> Result<()> {
        let fx = fixture();
        let a = fx.index("a.txt", "cats");
        fx.index("b.txt", "cats");
        fx.metadata.link_file_tag(&a, "keep")?;

        let mut query = SearchQuery::text("cats");
        query.tags = vec!["keep".to_string()];
        assert_eq!(fx.paths(&query), vec![key(&a)]);
        Ok(())
    }

    #[test]
    fn test_tag_only_search() -> Result<()> {
        let fx = fixture();
        let a = fx.index("a.txt", "alpha");
        let b = fx.index("b.md", "beta");
        fx.metadata.link_file_tag(&a, "x")?;
        fx.metadata.link_file_tag(&a, "y")?;
        fx.metadata.link_file_tag(&b, "y")?;

        let query = SearchQuery {
            tags: vec!["x".to_string(), "y".to_string()],
            ..SearchQuery::default()
        };
        let results = fx.engine.search(&query)?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 0.0);

        let query = SearchQuery {
            tags: vec!["y".to_string()],
            extensions: vec!["md".to_string()],
            ..SearchQuery::default()
        };
        assert_eq!(fx.paths(&query), vec![key(&b)]);

        // Tag mode reads bare text as a tag name
        let query = SearchQuery {
            text: "x".to_string(),
            mode: SearchMode::Tag,
            ..SearchQuery::default()
        };
        assert_eq!(fx.paths(&query), vec![key(&a)]);
        Ok(())
    }

    #[test]
    fn test_empty_query_returns_nothing() -> Result<()> {
        let fx = fixture();
        fx.index("a.txt", "alpha");
        assert!(fx.engine.search(&SearchQuery::text("  "))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_limit() -> Result<()> {
        let fx = fixture();
        for i in 0..5 {
            fx.index(&format!("{i}.txt"), "cats and more cats");
        }
        let mut query = SearchQuery::text("cats");
        query.limit = Some(2);
        assert_eq!(fx.paths(&query).len(), 2);
        Ok(())
    }
}
