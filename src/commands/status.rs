//! Status command - monitored folders, queue and index statistics

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use semdex::IndexStats;

use super::{format_timestamp, open_indexer, pad, truncate_left};

const PENDING_SHOWN: usize = 10;

pub fn run(data_dir: Option<PathBuf>, json: bool) -> Result<()> {
    let indexer = open_indexer(data_dir)?;
    let roots = indexer.roots();
    let exceptions = indexer.exceptions();
    let stats = indexer.stats()?;
    let pending = indexer.queue().list_pending();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "roots": roots,
                "exceptions": exceptions,
                "stats": stats,
                "pending": pending,
            }))?
        );
        return Ok(());
    }

    println!("{}", "Semdex Status".bold());
    println!("{}", "=".repeat(50));
    println!();

    println!("{}", "Monitored folders".cyan());
    println!("{}", "-".repeat(30));
    if roots.is_empty() {
        println!("   {}", "(none) add one with `semdex index <folder>`".dimmed());
    }
    for root in &roots {
        println!("   {}", root.display());
    }
    if !exceptions.is_empty() {
        println!();
        println!("{}", "Excluded".cyan());
        println!("{}", "-".repeat(30));
        for path in &exceptions {
            println!("   {}", path.display().to_string().dimmed());
        }
    }
    println!();

    print_stats(&stats);

    if !pending.is_empty() {
        println!();
        println!("{}", "Queue".cyan());
        println!("{}", "-".repeat(30));
        for task in pending.iter().take(PENDING_SHOWN) {
            println!(
                "   {} {}",
                pad(&task.kind.to_string(), 7),
                truncate_left(&task.path.display().to_string(), 70)
            );
        }
        if pending.len() > PENDING_SHOWN {
            println!("   ... and {} more", pending.len() - PENDING_SHOWN);
        }
    }

    println!();
    println!("{}", "=".repeat(50));
    Ok(())
}

fn print_stats(stats: &IndexStats) {
    println!("{}", "Index".cyan());
    println!("{}", "-".repeat(30));
    println!("   {} {:>6}", pad("Files", 14), stats.files);
    println!("   {} {:>6}", pad("Vectors", 14), stats.vectors);
    println!("   {} {:>6}", pad("Tags", 14), stats.tags);
    println!("   {} {:>6}", pad("Pending", 14), stats.pending);
    if let Some(task) = &stats.current {
        println!("   {} {}", pad("Processing", 14), task.path.display());
    }
    match stats.last_indexed {
        Some(ts) => println!("   {} {}", pad("Last indexed", 14), format_timestamp(ts)),
        None => println!("   {} {}", pad("Last indexed", 14), "never".dimmed()),
    }
}
