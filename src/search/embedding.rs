//! Embedding providers
//!
//! The built-in provider is Harmonic Token Projection (HTP), a deterministic,
//! training-free text embedding:
//! "Harmonic Token Projection: A Vocabulary-Free, Training-Free,
//!  Deterministic, and Reversible Embedding Methodology"
//! https://arxiv.org/html/2511.20665
//!
//! Images are projected into the same space from a small grayscale
//! thumbnail. An Ollama-backed provider is available with the `llm` feature.

use std::f64::consts::PI;
use std::path::Path;

use crate::core::config::{EmbeddingConfig, EmbeddingProvider};
use crate::core::error::{Error, Result};

/// Embedding dimension (2 * number of coprime moduli)
pub const EMBEDDING_DIM: usize = 384;

const NUM_MODULI: usize = EMBEDDING_DIM / 2;

/// Maximum token length (Unicode code points)
const MAX_TOKEN_LENGTH: usize = 64;

/// Thumbnail geometry for image vectors; width * height == EMBEDDING_DIM
const THUMB_WIDTH: u32 = 24;
const THUMB_HEIGHT: u32 = 16;

/// First NUM_MODULI primes, pairwise coprime by construction
static COPRIME_MODULI: &[u64] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71,
    73, 79, 83, 89, 97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151,
    157, 163, 167, 173, 179, 181, 191, 193, 197, 199, 211, 223, 227, 229, 233,
    239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307, 311, 313, 317,
    331, 337, 347, 349, 353, 359, 367, 373, 379, 383, 389, 397, 401, 409, 419,
    421, 431, 433, 439, 443, 449, 457, 461, 463, 467, 479, 487, 491, 499, 503,
    509, 521, 523, 541, 547, 557, 563, 569, 571, 577, 587, 593, 599, 601, 607,
    613, 617, 619, 631, 641, 643, 647, 653, 659, 661, 673, 677, 683, 691, 701,
    709, 719, 727, 733, 739, 743, 751, 757, 761, 769, 773, 787, 797, 809, 811,
    821, 823, 827, 829, 839, 853, 857, 859, 863, 877, 881, 883, 887, 907, 911,
    919, 929, 937, 941, 947, 953, 967, 971, 977, 983, 991, 997, 1009, 1013,
    1019, 1021, 1031, 1033, 1039, 1049, 1051, 1061, 1063, 1069, 1087, 1091,
    1093, 1097, 1103, 1109, 1117, 1123, 1129, 1151, 1153, 1163, 1171, 1181,
];

/// Text and image encoder consumed by the scanner and search.
///
/// Every vector returned must have exactly `dimension()` components.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// One vector per input, in input order
    fn encode_text(&self, batch: &[String]) -> Result<Vec<Vec<f32>>>;

    fn encode_image(&self, path: &Path) -> Result<Vec<f32>>;

    fn encode_query(&self, query: &str) -> Result<Vec<f32>> {
        self.encode_text(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty response for query".to_string()))
    }
}

/// Pick the provider named in the configuration
pub fn from_config(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Htp => Ok(Box::new(HtpEmbedder::new())),
        #[cfg(feature = "llm")]
        EmbeddingProvider::Ollama => Ok(Box::new(ollama::OllamaEmbedder::new(config)?)),
        #[cfg(not(feature = "llm"))]
        EmbeddingProvider::Ollama => Err(Error::Config(
            "ollama embeddings require the `llm` feature".to_string(),
        )),
    }
}

/// HTP embedding model
pub struct HtpEmbedder {
    moduli: Vec<u64>,
}

impl HtpEmbedder {
    pub fn new() -> Self {
        Self {
            moduli: COPRIME_MODULI[..NUM_MODULI].to_vec(),
        }
    }

    /// Tokenize, project each token, mean-pool, L2-normalize
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; EMBEDDING_DIM];
        }

        let mut sum = vec![0.0f64; EMBEDDING_DIM];
        for token in &tokens {
            for (acc, val) in sum.iter_mut().zip(self.embed_token(token)) {
                *acc += val;
            }
        }
        for val in &mut sum {
            *val /= tokens.len() as f64;
        }

        l2_normalize(&sum)
    }

    /// Project a token onto the unit circle once per modulus:
    /// E_i = [sin(2πr_i/m_i), cos(2πr_i/m_i)] with r_i = N mod m_i
    fn embed_token(&self, token: &str) -> Vec<f64> {
        let n = token_to_integer(token);
        self.moduli
            .iter()
            .flat_map(|&m| {
                let theta = 2.0 * PI * ((n % m) as f64) / (m as f64);
                [theta.sin(), theta.cos()]
            })
            .collect()
    }
}

impl Default for HtpEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HtpEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn encode_text(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(batch.iter().map(|t| self.embed(t)).collect())
    }

    fn encode_image(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path).map_err(|e| Error::Embedding(e.to_string()))?;
        let thumb = img
            .resize_exact(
                THUMB_WIDTH,
                THUMB_HEIGHT,
                image::imageops::FilterType::Triangle,
            )
            .to_luma8();

        let pixels: Vec<f64> = thumb.pixels().map(|p| p.0[0] as f64 / 255.0).collect();
        let mean = pixels.iter().sum::<f64>() / pixels.len().max(1) as f64;
        let centered: Vec<f64> = pixels.iter().map(|p| p - mean).collect();

        Ok(l2_normalize(&centered))
    }
}

/// N = Σ u_j * B^(L-j) with B = 2^16, wrapping on overflow
fn token_to_integer(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_LENGTH)
        .fold(0u64, |n, c| n.wrapping_mul(65536).wrapping_add(c as u64))
}

/// Lowercased words split on whitespace and ASCII punctuation
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

fn l2_normalize(values: &[f64]) -> Vec<f32> {
    let norm = values.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| (x / norm) as f32).collect()
    } else {
        values.iter().map(|x| *x as f32).collect()
    }
}

/// Cosine similarity between two embeddings; 0.0 for mismatched lengths
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

#[cfg(feature = "llm")]
mod ollama {
    use std::path::Path;
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use super::Embedder;
    use crate::core::config::EmbeddingConfig;
    use crate::core::error::{Error, Result};

    #[derive(Serialize)]
    struct EmbedRequest<'a> {
        model: &'a str,
        input: &'a [String],
    }

    #[derive(Deserialize)]
    struct EmbedResponse {
        embeddings: Vec<Vec<f32>>,
    }

    /// Text embeddings from a local Ollama server (`/api/embed`)
    pub struct OllamaEmbedder {
        client: reqwest::blocking::Client,
        url: String,
        model: String,
        dimension: usize,
    }

    impl OllamaEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .map_err(|e| Error::Config(e.to_string()))?;
            Ok(Self {
                client,
                url: format!("{}/api/embed", config.base_url.trim_end_matches('/')),
                model: config.model.clone(),
                dimension: config.dimension,
            })
        }
    }

    impl Embedder for OllamaEmbedder {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn encode_text(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
            let response: EmbedResponse = self
                .client
                .post(&self.url)
                .json(&EmbedRequest {
                    model: &self.model,
                    input: batch,
                })
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json())
                .map_err(|e| Error::Embedding(e.to_string()))?;

            if response.embeddings.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            Ok(response.embeddings)
        }

        fn encode_image(&self, _path: &Path) -> Result<Vec<f32>> {
            Err(Error::Embedding(format!(
                "model {} does not accept image input",
                self.model
            )))
        }
    }
}
