//! Automatic tagging through a keyword-generating language model.
//!
//! The tagger never fails: provider errors are logged and produce no tags.

#[cfg(feature = "llm")]
pub mod llm;

use std::path::Path;

use tracing::{debug, warn};

use crate::core::config::{LlmConfig, LlmProvider};
use crate::core::error::Result;
use crate::core::paths::extension_of;
use crate::indexing::extract::{extract_text, is_text_or_document};

/// Characters of extracted text included in the content summary
pub const SUMMARY_TEXT_CHARS: usize = 500;

/// Tags kept from a single response
pub const MAX_TAGS: usize = 5;

/// A model that proposes tag names for a described file
pub trait KeywordGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Raw keywords for `description`, given the tags already in use
    fn generate_keywords(&self, description: &str, vocabulary: &[String]) -> Result<Vec<String>>;
}

/// Build the configured generator; `None` when tagging is disabled
pub fn from_config(config: &LlmConfig) -> Result<Option<Box<dyn KeywordGenerator>>> {
    match config.provider {
        LlmProvider::Disabled => Ok(None),
        #[cfg(feature = "llm")]
        LlmProvider::Ollama => Ok(Some(Box::new(llm::OllamaGenerator::new(config)?))),
        #[cfg(feature = "llm")]
        LlmProvider::OpenAi => Ok(Some(Box::new(llm::OpenAiGenerator::new(config)?))),
        #[cfg(feature = "llm")]
        LlmProvider::Gemini => Ok(Some(Box::new(llm::GeminiGenerator::new(config)?))),
        #[cfg(not(feature = "llm"))]
        other => Err(crate::core::error::Error::Config(format!(
            "tagging provider {other:?} requires the `llm` feature"
        ))),
    }
}

/// Turns a file into a description and the model's answer into tag names
pub struct AutoTagger {
    generator: Option<Box<dyn KeywordGenerator>>,
}

impl AutoTagger {
    pub fn new(generator: Option<Box<dyn KeywordGenerator>>) -> Self {
        Self { generator }
    }

    pub fn disabled() -> Self {
        Self { generator: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Tags for `path`, at most [`MAX_TAGS`]; empty on any failure
    pub fn generate_tags(&self, path: &Path, vocabulary: &[String]) -> Vec<String> {
        let Some(generator) = &self.generator else {
            return Vec::new();
        };

        let summary = content_summary(path);
        match generator.generate_keywords(&summary, vocabulary) {
            Ok(raw) => {
                let tags = clean_keywords(raw);
                debug!(path = %path.display(), generator = generator.name(), ?tags, "tags generated");
                tags
            }
            Err(e) => {
                warn!(path = %path.display(), generator = generator.name(), "tag generation failed: {e}");
                Vec::new()
            }
        }
    }
}

/// File name, extension and the beginning of any extractable text
pub fn content_summary(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut summary = format!("File name: {name}, extension: .{}", extension_of(path));

    if is_text_or_document(path) {
        let text = extract_text(path);
        let excerpt: String = text.chars().take(SUMMARY_TEXT_CHARS).collect();
        let excerpt = excerpt.trim();
        if !excerpt.is_empty() {
            summary.push_str("\nContent: ");
            summary.push_str(excerpt);
        }
    }
    summary
}

/// Prompt shared by every provider
pub fn build_prompt(description: &str, vocabulary: &[String]) -> String {
    let existing = if vocabulary.is_empty() {
        "(none)".to_string()
    } else {
        vocabulary.join(", ")
    };
    format!(
        "{description}\nExisting tags: {existing}\n\
         Suggest 3 short tags for this file, reusing existing tags where they fit. \
         Answer with the tags only, separated by commas."
    )
}

/// Split a free-form model answer into keywords
pub fn parse_keywords(text: &str) -> Vec<String> {
    clean_keywords(text.split([',', '\n']).map(str::to_string))
}

fn clean_keywords(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .flat_map(|k| {
            k.split([',', '\n'])
                .map(strip_list_marker)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|t| seen.insert(t.to_lowercase()))
        .take(MAX_TAGS)
        .collect()
}

/// `- tag`, `* tag`, `#tag`, `1. tag`, `"tag"` all become `tag`
fn strip_list_marker(item: &str) -> String {
    let mut s = item.trim();
    s = s.trim_start_matches(|c: char| matches!(c, '-' | '*' | '#' | '•') || c.is_whitespace());

    let digits = s.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = s[digits..].strip_prefix(['.', ')']) {
            s = rest.trim_start();
        }
    }

    s.trim_matches(|c| matches!(c, '"' | '\'' | '`' | '.'))
        .trim()
        .to_string()
}
