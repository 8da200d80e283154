//! Search command - vector, tag and extension search

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use semdex::{SearchMode, SearchQuery, TagLogic};

use super::{open_indexer, truncate_left};

const PATH_COLUMNS: usize = 90;

pub struct SearchArgs {
    pub query: String,
    pub mode: SearchMode,
    pub extensions: Vec<String>,
    pub tags: Vec<String>,
    pub any: bool,
    pub limit: Option<usize>,
    pub json: bool,
}

/// Run search command
pub fn run(data_dir: Option<PathBuf>, args: SearchArgs) -> Result<()> {
    let indexer = open_indexer(data_dir)?;
    let query = SearchQuery {
        text: args.query.clone(),
        mode: args.mode,
        extensions: args.extensions,
        tags: args.tags,
        tag_logic: if args.any { TagLogic::Or } else { TagLogic::And },
        limit: Some(args.limit.unwrap_or(10)),
    };
    let results = indexer.search(&query)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    let label = if args.query.trim().is_empty() {
        query.tags.join(", ")
    } else {
        args.query.clone()
    };
    if results.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), label.cyan());
        return Ok(());
    }

    println!(
        "{} {} results for: {} ({})",
        "→".dimmed(),
        results.len(),
        label.cyan(),
        query.mode
    );
    println!();

    for (i, result) in results.iter().enumerate() {
        let score_str = format!("{:.2}", result.score);
        let score_colored = if result.score > 0.8 {
            score_str.green()
        } else if result.score > 0.6 {
            score_str.yellow()
        } else {
            score_str.dimmed()
        };

        println!(
            "{}. [{}] {}",
            (i + 1).to_string().bold(),
            score_colored,
            truncate_left(&result.path, PATH_COLUMNS).cyan()
        );
        if !result.tags.is_empty() {
            let tags: Vec<String> = result.tags.iter().map(|t| format!("#{}", t.name)).collect();
            println!("   {}", tags.join(" ").dimmed());
        }
    }

    Ok(())
}
