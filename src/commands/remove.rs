//! Remove command - stop monitoring a folder or exclude a sub-path

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use semdex::RemoveOutcome;

use super::open_indexer;

pub fn run(data_dir: Option<PathBuf>, path: &Path) -> Result<()> {
    let indexer = open_indexer(data_dir)?;
    let shown = path.display().to_string();

    match indexer.remove_path(path)? {
        RemoveOutcome::RootRemoved { purged } => {
            println!("{} Stopped monitoring {}", "✓".green().bold(), shown.cyan());
            println!("  {} Removed {} files from the index", "→".dimmed(), purged);
        }
        RemoveOutcome::Excluded => {
            println!("{} Excluded {}", "✓".green().bold(), shown.cyan());
            println!(
                "  {} Existing data is kept but hidden from search; {} re-includes it",
                "→".dimmed(),
                format!("semdex index {shown}").cyan()
            );
        }
        RemoveOutcome::NotMonitored => {
            println!("{} {} is not monitored", "!".yellow().bold(), shown);
        }
    }
    Ok(())
}
