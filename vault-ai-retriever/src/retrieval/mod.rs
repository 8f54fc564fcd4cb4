//! Core indexing and retrieval pipeline.
//!
//! ```text
//! Vault files → scanner → fingerprint diff → chunker → embeddings → SQLite
//!                                                                      ↓
//!                              Citations ← Retriever ← cosine query ←──┘
//! ```
//!
//! - [`scanner`]: vault filesystem walk
//! - [`fingerprint`]: content hashing and manifest diffing
//! - [`note_index`]: SQLite-backed vector index
//! - [`indexer`]: full and incremental builds
//! - [`retriever`]: search and citation assembly

pub mod fingerprint;
pub mod indexer;
pub mod note_index;
pub mod retriever;
pub mod scanner;

pub use fingerprint::{ChangeKind, ManifestEntry, NoteAction, VaultDiff};
pub use indexer::{BuildMode, IndexReport, Indexer, IndexerConfig};
pub use note_index::{EmbeddedChunk, IndexStats, NoteIndex, StoredChunk};
pub use retriever::{Citation, DedupeMode, Retriever, SearchOptions};
pub use scanner::ScannedNote;
