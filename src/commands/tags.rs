//! Tags command - manage tags and file tag sets

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use semdex::core::paths::normalize_path;
use semdex::search::MetadataStore;

use super::{data_paths, pad};

fn open_store(data_dir: Option<PathBuf>) -> Result<MetadataStore> {
    let paths = data_paths(data_dir);
    paths.ensure_exists()?;
    MetadataStore::open(&paths.metadata_db)
        .with_context(|| format!("Failed to open {}", paths.metadata_db.display()))
}

pub fn list(data_dir: Option<PathBuf>, json: bool) -> Result<()> {
    let tags = open_store(data_dir)?.all_tags()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
        return Ok(());
    }
    if tags.is_empty() {
        println!("{} No tags", "→".dimmed());
        return Ok(());
    }

    let width = tags
        .iter()
        .map(|t| unicode_width::UnicodeWidthStr::width(t.name.as_str()))
        .max()
        .unwrap_or(0);
    for tag in &tags {
        println!("  #{} {}", pad(&tag.name, width), tag.color.dimmed());
    }
    println!();
    println!("{} tags", tags.len().to_string().cyan());
    Ok(())
}

pub fn add(data_dir: Option<PathBuf>, name: &str, color: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Tag name cannot be empty");
    }
    open_store(data_dir)?.add_tag(name, color)?;
    println!("{} Tag #{} ready", "✓".green().bold(), name.cyan());
    Ok(())
}

pub fn delete(data_dir: Option<PathBuf>, name: &str) -> Result<()> {
    if open_store(data_dir)?.delete_tag(name)? {
        println!("{} Deleted #{}", "✓".green().bold(), name.cyan());
    } else {
        println!("{} No tag named #{}", "!".yellow().bold(), name);
    }
    Ok(())
}

pub fn rename(data_dir: Option<PathBuf>, old: &str, new: &str) -> Result<()> {
    if open_store(data_dir)?.rename_tag(old, new.trim())? {
        println!(
            "{} Renamed #{} to #{}",
            "✓".green().bold(),
            old,
            new.trim().cyan()
        );
        Ok(())
    } else {
        bail!("Cannot rename #{old}: it does not exist or #{new} is taken")
    }
}

pub fn color(data_dir: Option<PathBuf>, name: &str, color: &str) -> Result<()> {
    if open_store(data_dir)?.update_tag_color(name, color)? {
        println!("{} #{} is now {}", "✓".green().bold(), name.cyan(), color);
        Ok(())
    } else {
        bail!("No tag named #{name}")
    }
}

pub fn set(data_dir: Option<PathBuf>, path: &Path, tags: &[String]) -> Result<()> {
    let path = normalize_path(path);
    let tags: Vec<String> = tags
        .iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if !open_store(data_dir)?.set_file_tags(&path, &tags)? {
        bail!("{} is neither indexed nor an existing file", path.display());
    }
    if tags.is_empty() {
        println!("{} Cleared tags of {}", "✓".green().bold(), path.display());
    } else {
        println!(
            "{} {} → {}",
            "✓".green().bold(),
            path.display(),
            tags.iter()
                .map(|t| format!("#{t}"))
                .collect::<Vec<_>>()
                .join(" ")
                .cyan()
        );
    }
    Ok(())
}

pub fn show(data_dir: Option<PathBuf>, path: &Path) -> Result<()> {
    let path = normalize_path(path);
    let tags = open_store(data_dir)?.tags_for_file(&path)?;
    if tags.is_empty() {
        println!("{} {} has no tags", "→".dimmed(), path.display());
        return Ok(());
    }
    println!("{}", path.display().to_string().bold());
    for tag in tags {
        println!("  #{}", tag.cyan());
    }
    Ok(())
}
