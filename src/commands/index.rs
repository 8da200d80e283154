//! Index command - monitor a folder and index it

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use semdex::{AddOutcome, SemanticIndexer};

use super::{format_timestamp, open_indexer};

/// Run index command
pub fn run(
    data_dir: Option<PathBuf>,
    folder: Option<PathBuf>,
    status_only: bool,
    rebuild: bool,
    json: bool,
) -> Result<()> {
    let indexer = open_indexer(data_dir)?;

    if status_only {
        return show_status(&indexer, json);
    }

    let start = Instant::now();
    indexer.start_worker();

    let walks = if rebuild {
        if !json {
            println!("{} Rebuilding index...", "→".dimmed());
        }
        let mut walks = indexer.rebuild().context("Failed to clear index")?;
        if let Some(folder) = &folder {
            walks.push(indexer.index_folder(folder)?);
        }
        walks
    } else {
        let Some(folder) = folder else {
            bail!("Specify a folder to index, or use --status / --rebuild");
        };
        let walk = indexer
            .index_folder(&folder)
            .with_context(|| format!("Cannot index {}", folder.display()))?;
        if !json {
            let note = match walk.outcome {
                AddOutcome::RootAdded => "Added monitored folder",
                AddOutcome::Unexcluded => "Re-included excluded path",
                AddOutcome::AlreadyMonitored => "Refreshing monitored folder",
            };
            println!("{} {}: {}", "→".dimmed(), note, folder.display().to_string().cyan());
        }
        vec![walk]
    };

    let queued: usize = walks.into_iter().map(|w| w.join()).sum();
    if !json {
        println!("{} Indexing {} files...", "→".dimmed(), queued);
    }
    if !indexer.wait_until_idle(None) {
        bail!("Indexing worker stopped before the queue drained");
    }
    let stats = indexer.stats()?;
    let duration_ms = start.elapsed().as_millis();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "queued": queued,
                "files": stats.files,
                "vectors": stats.vectors,
                "duration_ms": duration_ms,
            })
        );
    } else {
        println!();
        println!(
            "{} Processed {} files in {:.2}s",
            "✓".green().bold(),
            queued.to_string().cyan(),
            duration_ms as f64 / 1000.0
        );
        println!(
            "  {} {} files, {} vectors in index",
            "→".dimmed(),
            stats.files,
            stats.vectors
        );
    }

    Ok(())
}

/// Show index status
fn show_status(indexer: &SemanticIndexer, json: bool) -> Result<()> {
    let stats = indexer.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "Index Status".bold());
    println!();
    println!("  {} {} files indexed", "→".dimmed(), stats.files.to_string().cyan());
    println!("  {} {} vectors", "→".dimmed(), stats.vectors.to_string().cyan());
    println!("  {} {} tags", "→".dimmed(), stats.tags.to_string().cyan());
    if let Some(ts) = stats.last_indexed {
        println!("  {} Last indexed: {}", "→".dimmed(), format_timestamp(ts));
    }
    if stats.vector_refs != stats.vectors {
        println!(
            "  {} {} vector refs but {} vectors; run {}",
            "!".yellow().bold(),
            stats.vector_refs,
            stats.vectors,
            "semdex index --rebuild".cyan()
        );
    }
    Ok(())
}
