//! Persisted configuration (`config.json`).

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::Result;

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Monitored folders
    pub indexed_folders: Vec<PathBuf>,
    /// Paths excluded from monitored folders
    pub excluded_paths: Vec<PathBuf>,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Disabled,
    Ollama,
    OpenAi,
    Gemini,
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!(
                "unknown provider '{other}' (expected disabled, ollama, openai or gemini)"
            )),
        }
    }
}

impl LlmProvider {
    /// Model used when none is configured
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Disabled | Self::Ollama => "llama3",
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-1.5-flash",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Disabled,
            model: "llama3".to_string(),
            api_key: String::new(),
            base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Built-in Harmonic Token Projection
    #[default]
    Htp,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: String,
    /// Only consulted for external providers; HTP is fixed at 384
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Htp,
            model: "nomic-embed-text".to_string(),
            base_url: "http://localhost:11434".to_string(),
            dimension: 768,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks encoded per embedding call
    pub batch_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 200,
            batch_size: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexingConfig {
    /// Larger files are indexed metadata-only (bytes)
    pub max_file_size: u64,
    /// Worker back-off when the queue is empty
    pub idle_ms: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_size: 52_428_800, // 50MB
            idle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { top_k: 50 }
    }
}

/// Loads, caches and rewrites `config.json`.
///
/// Every mutation is written back to disk immediately.
pub struct ConfigManager {
    path: PathBuf,
    config: RwLock<Config>,
}

impl ConfigManager {
    /// Load from `path`, falling back to defaults if it is missing or unreadable
    pub fn load(path: &Path) -> Self {
        let config = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), "invalid config, using defaults: {e}");
                Config::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                warn!(path = %path.display(), "cannot read config, using defaults: {e}");
                Config::default()
            }
        };

        Self {
            path: path.to_path_buf(),
            config: RwLock::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` to the configuration and persist the result
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
        self.save(&guard)
    }

    fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, text)?;
        debug!(path = %self.path.display(), "config saved");
        Ok(())
    }

    pub fn folders(&self) -> Vec<PathBuf> {
        self.get().indexed_folders
    }

    pub fn exclusions(&self) -> Vec<PathBuf> {
        self.get().excluded_paths
    }

    pub fn llm_config(&self) -> LlmConfig {
        self.get().llm
    }

    pub fn set_llm_config(&self, llm: LlmConfig) -> Result<()> {
        self.update(|c| c.llm = llm)
    }
}
