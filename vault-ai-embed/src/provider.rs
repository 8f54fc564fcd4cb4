//! Embedding provider trait and the deterministic hashing provider

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a result from a vector of f16 embeddings. The dimension is
    /// inferred from the first vector; an empty result has dimension 0.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Stable identity string for this provider and model, recorded in the
    /// index and compared at query time
    fn provider_id(&self) -> String;
}

/// Deterministic embedding provider based on token hashing.
///
/// Each whitespace-separated token is FNV-hashed into a bucket of the output
/// vector; the vector is then L2-normalized. The result is a crude
/// bag-of-words embedding: texts sharing tokens score higher under cosine
/// similarity, identical texts embed identically. No model files, no network,
/// no nondeterminism, which is exactly what tests and offline indexing need.
#[derive(Debug, Clone)]
pub struct HashEmbedProvider {
    config: EmbedConfig,
}

impl HashEmbedProvider {
    pub fn new(config: EmbedConfig) -> Self {
        Self { config }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self::new(EmbedConfig::default().with_dimension(dimension))
    }

    fn embed_one(&self, text: &str) -> Vec<f16> {
        let dim = self.config.dimension;
        let mut accum = vec![0.0f32; dim];

        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = FnvHasher::default();
            hasher.write(token.as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % dim as u64) as usize;
            // Second hash bit picks the sign so common tokens don't all
            // pile up positive.
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            accum[bucket] += sign;
        }

        let norm: f32 = accum.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut accum {
                *value /= norm;
            }
        }
        accum.into_iter().map(f16::from_f32).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        if self.config.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be nonzero"));
        }
        Ok(self.embed_one(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if self.config.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be nonzero"));
        }
        let embeddings = texts.iter().map(|t| self.embed_one(t)).collect();
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }

    fn provider_id(&self) -> String {
        format!("hash:{}:{}", self.config.model_name, self.config.dimension)
    }
}
