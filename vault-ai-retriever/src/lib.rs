//! vault-ai-retriever: semantic indexing and retrieval for markdown vaults
//!
//! This crate maintains a persisted vector index over a directory of notes
//! and answers semantic queries with citations back to the exact note and
//! heading the content came from. Builds are incremental: only notes whose
//! content actually changed are re-chunked and re-embedded.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: scanner, fingerprint diffing, SQLite vector index,
//!   index builds, and search
//! - **[`error`]**: the [`IndexError`](error::IndexError) type shared by the
//!   pipeline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vault_ai_retriever::retrieval::{
//!     BuildMode, Indexer, IndexerConfig, NoteIndex, Retriever, SearchOptions,
//! };
//! use vault_ai_embed::HashEmbedProvider;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let index = NoteIndex::open(std::path::Path::new("vault/.vault-ai.db")).await?;
//! let provider = Arc::new(HashEmbedProvider::with_dimension(256));
//!
//! let indexer = Indexer::new(IndexerConfig::new("vault"), index.clone(), provider.clone());
//! let report = indexer.build(BuildMode::Incremental).await?;
//! println!("{} added, {} changed", report.added, report.changed);
//!
//! let retriever = Retriever::new("vault", index, provider);
//! for citation in retriever.search("how do lifetimes work", &SearchOptions::default()).await? {
//!     println!("{} {:?} ({:.2})", citation.note_path, citation.heading_path, citation.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod retrieval;

pub use error::{IndexError, Result};
