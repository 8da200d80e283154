//! Config command - inspect settings and configure automatic tagging

use std::path::PathBuf;

use anyhow::{bail, Result};
use colored::Colorize;
use semdex::{ConfigManager, LlmConfig, LlmProvider};

use super::data_paths;

fn open_config(data_dir: Option<PathBuf>) -> Result<ConfigManager> {
    let paths = data_paths(data_dir);
    paths.ensure_exists()?;
    Ok(ConfigManager::load(&paths.config))
}

pub fn set_llm(
    data_dir: Option<PathBuf>,
    provider: LlmProvider,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
) -> Result<()> {
    let manager = open_config(data_dir)?;
    let previous = manager.llm_config();

    // Keep the stored key when only the model or provider changes
    let api_key = api_key.unwrap_or(previous.api_key);
    if matches!(provider, LlmProvider::OpenAi | LlmProvider::Gemini) && api_key.is_empty() {
        bail!("{:?} requires --api-key", provider);
    }

    let llm = LlmConfig {
        provider,
        model: model.unwrap_or_else(|| provider.default_model().to_string()),
        api_key,
        base_url: base_url.unwrap_or_default(),
    };
    let model = llm.model.clone();
    manager.set_llm_config(llm)?;

    if provider == LlmProvider::Disabled {
        println!("{} Automatic tagging disabled", "✓".green().bold());
    } else {
        println!(
            "{} Automatic tagging via {:?} ({})",
            "✓".green().bold(),
            provider,
            model.cyan()
        );
    }
    println!("  {} {}", "→".dimmed(), manager.path().display());
    Ok(())
}

pub fn show(data_dir: Option<PathBuf>, reveal: bool) -> Result<()> {
    let manager = open_config(data_dir)?;
    let mut config = manager.get();
    if !reveal && !config.llm.api_key.is_empty() {
        config.llm.api_key = mask(&config.llm.api_key);
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn mask(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if key.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("****{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask("short"), "****");
        assert_eq!(mask("sk-abcdefghijkl"), "****ijkl");
    }
}
