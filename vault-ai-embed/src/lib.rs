//! # vault-ai-embed
//!
//! Embedding providers for the vault-ai indexing pipeline. Embeddings are
//! half-precision (`f16`) and L2-normalized, so cosine similarity reduces to
//! a dot product.
//!
//! Two providers ship here:
//!
//! - [`HashEmbedProvider`] — deterministic token-hashing embeddings, always
//!   available. No model files, no network. Used in tests and offline setups.
//! - `FastEmbedProvider` — local ONNX model via fastembed, behind the
//!   `fastembed` cargo feature.
//!
//! ```
//! use vault_ai_embed::{EmbeddingProvider, HashEmbedProvider};
//!
//! # async fn example() -> vault_ai_embed::Result<()> {
//! let provider = HashEmbedProvider::with_dimension(256);
//! let embedding = provider.embed_text("a note about rust lifetimes").await?;
//! assert_eq!(embedding.len(), 256);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
#[cfg(feature = "fastembed")]
pub mod fastembed;
pub mod provider;

// Re-export main types for easy access
pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
#[cfg(feature = "fastembed")]
pub use fastembed::FastEmbedProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, HashEmbedProvider};
