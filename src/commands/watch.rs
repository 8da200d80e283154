//! Watch command - keep the index in sync with monitored folders

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;

use super::open_indexer;

const POLL: Duration = Duration::from_secs(2);

/// Run until the process is interrupted
pub fn run(data_dir: Option<PathBuf>) -> Result<()> {
    let indexer = open_indexer(data_dir)?;
    let roots = indexer.roots();
    if roots.is_empty() {
        println!(
            "{} No monitored folders; add one with {}",
            "!".yellow().bold(),
            "semdex index <folder>".cyan()
        );
        return Ok(());
    }

    indexer.start();
    // Catch up on changes made while nothing was watching
    for root in &roots {
        if let Err(e) = indexer.index_folder(root) {
            println!("{} Skipping {}: {e}", "!".yellow().bold(), root.display());
        }
    }

    println!("{} Watching {} folders (Ctrl-C to stop)", "→".dimmed(), roots.len());
    for root in &roots {
        println!("   {}", root.display().to_string().cyan());
    }

    let mut last = (usize::MAX, usize::MAX);
    loop {
        thread::sleep(POLL);
        let stats = indexer.stats()?;
        let now = (stats.files, stats.pending);
        if now != last {
            println!(
                "{} {} files indexed, {} pending",
                "→".dimmed(),
                stats.files,
                stats.pending
            );
            last = now;
        }
    }
}
