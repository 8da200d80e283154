/// End-to-end tests: folders in, queries out
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use semdex::core::paths::normalize_path;
use semdex::indexing::NullWatcher;
use semdex::tagging::{AutoTagger, KeywordGenerator};
use semdex::{
    AddOutcome, Components, DataPaths, IndexQueue, RemoveOutcome, SearchMode, SearchQuery,
    SemanticIndexer, TagLogic, TaskKind,
};
use tempfile::TempDir;

/// Tags picked from words in the file name
struct NameTags;

impl KeywordGenerator for NameTags {
    fn name(&self) -> &str {
        "name-tags"
    }

    fn generate_keywords(&self, description: &str, _vocab: &[String]) -> semdex::Result<Vec<String>> {
        let mut tags = Vec::new();
        if description.contains("beach") {
            tags.extend(["summer", "travel"]);
        }
        if description.contains("ski") {
            tags.extend(["winter", "travel"]);
        }
        if description.contains("pets") {
            tags.push("animals");
        }
        Ok(tags.into_iter().map(String::from).collect())
    }
}

struct Workspace {
    _dir: TempDir,
    base: PathBuf,
    indexer: SemanticIndexer,
}

fn workspace() -> Result<Workspace> {
    let dir = TempDir::new()?;
    let base = normalize_path(dir.path());

    let mut components = Components::open(&DataPaths::from_root(base.join("data")))?;
    components.watcher = Box::new(NullWatcher);
    components.tagger = AutoTagger::new(Some(Box::new(NameTags)));
    let indexer = SemanticIndexer::with_components(components);
    indexer.start_worker();

    Ok(Workspace {
        _dir: dir,
        base,
        indexer,
    })
}

impl Workspace {
    fn folder(&self, name: &str, files: &[(&str, &str)]) -> Result<PathBuf> {
        let folder = self.base.join(name);
        std::fs::create_dir_all(&folder)?;
        for (file, content) in files {
            std::fs::write(folder.join(file), content)?;
        }
        Ok(folder)
    }

    fn index(&self, folder: &Path) -> Result<usize> {
        let queued = self.indexer.index_folder(folder)?.join();
        assert!(
            self.indexer.wait_until_idle(Some(Duration::from_secs(30))),
            "indexing should drain"
        );
        Ok(queued)
    }

    fn tag_query(&self, tags: &[&str], logic: TagLogic) -> Result<Vec<String>> {
        let query = SearchQuery {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            tag_logic: logic,
            ..Default::default()
        };
        let mut paths: Vec<String> = self
            .indexer
            .search(&query)?
            .into_iter()
            .map(|r| file_name(&r.path))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[test]
fn test_indexed_text_is_found_and_tagged() -> Result<()> {
    let ws = workspace()?;
    let docs = ws.folder("docs", &[("pets.txt", "dogs and cats")])?;

    assert_eq!(ws.index(&docs)?, 1);

    let results = ws.indexer.search(&SearchQuery::text("cats"))?;
    assert_eq!(results.len(), 1);
    assert_eq!(file_name(&results[0].path), "pets.txt");
    assert!(results[0].score > 0.0);
    let tags: Vec<&str> = results[0].tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tags, vec!["animals"]);
    Ok(())
}

#[test]
fn test_tag_queries_and_or() -> Result<()> {
    let ws = workspace()?;
    let docs = ws.folder(
        "photos",
        &[
            ("beach.txt", "sand and waves"),
            ("ski.txt", "snow and mountains"),
            ("notes.txt", "shopping list"),
        ],
    )?;
    ws.index(&docs)?;

    assert_eq!(
        ws.tag_query(&["summer", "travel"], TagLogic::And)?,
        vec!["beach.txt"]
    );
    assert_eq!(
        ws.tag_query(&["summer", "winter"], TagLogic::Or)?,
        vec!["beach.txt", "ski.txt"]
    );
    assert!(ws.tag_query(&["summer", "winter"], TagLogic::And)?.is_empty());

    // Tag mode takes the query text as the tag
    let query = SearchQuery {
        text: "travel".to_string(),
        mode: SearchMode::Tag,
        ..Default::default()
    };
    assert_eq!(ws.indexer.search(&query)?.len(), 2);
    Ok(())
}

#[test]
fn test_tag_filter_narrows_vector_search() -> Result<()> {
    let ws = workspace()?;
    let docs = ws.folder(
        "trips",
        &[
            ("beach.txt", "a long trip by the sea"),
            ("ski.txt", "a long trip to the mountains"),
        ],
    )?;
    ws.index(&docs)?;

    let query = SearchQuery {
        text: "long trip".to_string(),
        tags: vec!["winter".to_string()],
        ..Default::default()
    };
    let results = ws.indexer.search(&query)?;
    assert_eq!(results.len(), 1);
    assert_eq!(file_name(&results[0].path), "ski.txt");
    Ok(())
}

#[test]
fn test_extension_filter() -> Result<()> {
    let ws = workspace()?;
    let docs = ws.folder(
        "mixed",
        &[("guide.md", "rust ownership guide"), ("guide.txt", "rust ownership guide")],
    )?;
    ws.index(&docs)?;

    let query = SearchQuery {
        text: "ownership".to_string(),
        extensions: vec![".md".to_string()],
        ..Default::default()
    };
    let results = ws.indexer.search(&query)?;
    assert_eq!(results.len(), 1);
    assert_eq!(file_name(&results[0].path), "guide.md");
    Ok(())
}

#[test]
fn test_removing_one_root_leaves_the_other() -> Result<()> {
    let ws = workspace()?;
    let a = ws.folder("a", &[("one.txt", "alpha document"), ("two.txt", "another alpha")])?;
    let b = ws.folder("b", &[("three.txt", "beta document")])?;
    ws.index(&a)?;
    ws.index(&b)?;
    assert_eq!(ws.indexer.stats()?.files, 3);

    assert_eq!(
        ws.indexer.remove_path(&a)?,
        RemoveOutcome::RootRemoved { purged: 2 }
    );

    let stats = ws.indexer.stats()?;
    assert_eq!(stats.files, 1);
    assert_eq!(stats.vectors, stats.vector_refs);
    assert_eq!(ws.indexer.roots(), vec![b.clone()]);

    let results = ws.indexer.search(&SearchQuery::text("document"))?;
    assert_eq!(results.len(), 1);
    assert_eq!(file_name(&results[0].path), "three.txt");
    Ok(())
}

#[test]
fn test_reindexing_unchanged_folder_is_stable() -> Result<()> {
    let ws = workspace()?;
    let docs = ws.folder("docs", &[("a.txt", "stable content")])?;
    ws.index(&docs)?;
    let before = ws.indexer.stats()?;

    let walk = ws.indexer.index_folder(&docs)?;
    assert_eq!(walk.outcome, AddOutcome::AlreadyMonitored);
    walk.join();
    assert!(ws.indexer.wait_until_idle(Some(Duration::from_secs(30))));

    let after = ws.indexer.stats()?;
    assert_eq!(before.files, after.files);
    assert_eq!(before.vectors, after.vectors);
    Ok(())
}

#[test]
fn test_queue_deletes_first_and_latest_request_wins() {
    let queue = IndexQueue::new();
    assert!(queue.enqueue("/x/a.txt", TaskKind::Update));
    assert!(queue.enqueue("/x/b.txt", TaskKind::Update));
    assert!(queue.enqueue("/x/c.txt", TaskKind::Delete));
    // Superseding a pending update
    queue.enqueue("/x/a.txt", TaskKind::Delete);
    assert_eq!(queue.pending_count(), 3);

    let order: Vec<(PathBuf, TaskKind)> = std::iter::from_fn(|| queue.dequeue())
        .map(|t| (t.path, t.kind))
        .collect();
    assert_eq!(
        order,
        vec![
            (PathBuf::from("/x/c.txt"), TaskKind::Delete),
            (PathBuf::from("/x/a.txt"), TaskKind::Delete),
            (PathBuf::from("/x/b.txt"), TaskKind::Update),
        ]
    );
    assert!(queue.is_idle());
}
