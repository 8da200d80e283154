//! CLI command implementations

pub mod config;
pub mod index;
pub mod remove;
pub mod search;
pub mod status;
pub mod tags;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use semdex::{DataPaths, SemanticIndexer};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Data paths from `--data-dir` / `SEMDEX_DATA_DIR`, else `./data`
pub fn data_paths(data_dir: Option<PathBuf>) -> DataPaths {
    match data_dir {
        Some(root) => DataPaths::from_root(root),
        None => DataPaths::new(),
    }
}

pub fn open_indexer(data_dir: Option<PathBuf>) -> Result<SemanticIndexer> {
    let paths = data_paths(data_dir);
    SemanticIndexer::open(&paths)
        .with_context(|| format!("Failed to open index in {}", paths.root.display()))
}

/// Pad `s` with spaces to `width` terminal columns
pub fn pad(s: &str, width: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    format!("{s}{}", " ".repeat(width.saturating_sub(w)))
}

/// Cut `s` to at most `max` terminal columns, keeping the end
pub fn truncate_left(s: &str, max: usize) -> String {
    if UnicodeWidthStr::width(s) <= max {
        return s.to_string();
    }
    let mut kept = Vec::new();
    let mut width = 1; // leading ellipsis
    for c in s.chars().rev() {
        let cw = c.width().unwrap_or(0);
        if width + cw > max {
            break;
        }
        width += cw;
        kept.push(c);
    }
    kept.reverse();
    format!("…{}", kept.into_iter().collect::<String>())
}

/// Local time for a Unix timestamp
pub fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|d| {
            d.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_counts_columns() {
        assert_eq!(pad("ab", 4), "ab  ");
        assert_eq!(pad("한글", 6), "한글  ");
        assert_eq!(pad("toolong", 3), "toolong");
    }

    #[test]
    fn test_truncate_left() {
        assert_eq!(truncate_left("/short", 10), "/short");
        assert_eq!(truncate_left("/a/very/long/path.txt", 10), "…/path.txt");
    }
}
