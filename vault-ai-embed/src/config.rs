//! Configuration for embedding providers

use serde::{Deserialize, Serialize};

/// Configuration shared by embedding providers.
///
/// Plain struct with builder-style `with_*` setters; defaults are usable as-is
/// for the deterministic hashing provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Model identifier, e.g. "hash-v1" or a fastembed model name.
    pub model_name: String,
    /// Embedding vector dimension.
    pub dimension: usize,
    /// Batch size used when embedding many texts at once.
    pub batch_size: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: "hash-v1".to_string(),
            dimension: 256,
            batch_size: 16,
        }
    }
}

impl EmbedConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_setters() {
        let config = EmbedConfig::new("all-MiniLM-L6-v2")
            .with_dimension(384)
            .with_batch_size(32);
        assert_eq!(config.model_name(), "all-MiniLM-L6-v2");
        assert_eq!(config.dimension, 384);
        assert_eq!(config.batch_size, 32);
    }
}
