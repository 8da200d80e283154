//! HTTP keyword generators (Ollama, OpenAI, Gemini).

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{build_prompt, parse_keywords, KeywordGenerator};
use crate::core::config::LlmConfig;
use crate::core::error::{Error, Result};

const OLLAMA_URL: &str = "http://localhost:11434";
const OPENAI_URL: &str = "https://api.openai.com/v1";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| Error::Config(e.to_string()))
}

fn base_url(config: &LlmConfig, default: &str) -> String {
    let url = if config.base_url.trim().is_empty() {
        default
    } else {
        config.base_url.trim()
    };
    url.trim_end_matches('/').to_string()
}

fn model(config: &LlmConfig) -> String {
    if config.model.trim().is_empty() {
        config.provider.default_model().to_string()
    } else {
        config.model.trim().to_string()
    }
}

fn require_key(config: &LlmConfig, provider: &str) -> Result<String> {
    if config.api_key.trim().is_empty() {
        return Err(Error::Config(format!("{provider} requires an api_key")));
    }
    Ok(config.api_key.trim().to_string())
}

fn send<T: DeserializeOwned>(request: reqwest::blocking::RequestBuilder) -> Result<T> {
    request
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.json())
        .map_err(|e| Error::Tagging(e.to_string()))
}

// ===== Ollama =====

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

/// Local Ollama server, `/api/generate`
pub struct OllamaGenerator {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: client()?,
            url: format!("{}/api/generate", base_url(config, OLLAMA_URL)),
            model: model(config),
        })
    }
}

impl KeywordGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    fn generate_keywords(&self, description: &str, vocabulary: &[String]) -> Result<Vec<String>> {
        let body = json!({
            "model": self.model,
            "prompt": build_prompt(description, vocabulary),
            "stream": false,
        });
        let response: OllamaResponse = send(self.client.post(&self.url).json(&body))?;
        Ok(parse_keywords(&response.response))
    }
}

// ===== OpenAI =====

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions
pub struct OpenAiGenerator {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: client()?,
            url: format!("{}/chat/completions", base_url(config, OPENAI_URL)),
            model: model(config),
            api_key: require_key(config, "openai")?,
        })
    }
}

impl KeywordGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate_keywords(&self, description: &str, vocabulary: &[String]) -> Result<Vec<String>> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": build_prompt(description, vocabulary)}],
        });
        let response: ChatResponse = send(
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body),
        )?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Tagging("empty completion".to_string()))?;
        Ok(parse_keywords(&text))
    }
}

// ===== Gemini =====

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

/// Google Gemini `generateContent`
pub struct GeminiGenerator {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = model(config);
        Ok(Self {
            client: client()?,
            url: format!("{}/models/{model}:generateContent", base_url(config, GEMINI_URL)),
            api_key: require_key(config, "gemini")?,
        })
    }
}

impl KeywordGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_keywords(&self, description: &str, vocabulary: &[String]) -> Result<Vec<String>> {
        let body = json!({
            "contents": [{"parts": [{"text": build_prompt(description, vocabulary)}]}],
        });
        let response: GeminiResponse = send(
            self.client
                .post(&self.url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body),
        )?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
            .ok_or_else(|| Error::Tagging("no candidates returned".to_string()))?;
        Ok(parse_keywords(&text))
    }
}
