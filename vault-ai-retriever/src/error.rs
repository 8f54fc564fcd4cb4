//! Error types for indexing and retrieval

use std::path::PathBuf;
use vault_ai_embed::EmbedError;

/// Result type for index and retrieval operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Error type for the indexing and retrieval layer.
///
/// Per-note failures during a build are NOT surfaced through this type; they
/// are collected into the build report so one bad note cannot abort a build.
/// `IndexError` is reserved for failures of the operation as a whole.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Filesystem error touching a vault file
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Embedding provider failure for a specific note
    #[error("Embedding failed for {path}: {source}")]
    Embedding {
        path: String,
        #[source]
        source: EmbedError,
    },

    /// SQLite-level failure
    #[error("Database error: {source}")]
    Database {
        #[from]
        source: sqlx::Error,
    },

    /// The index database is unreadable or structurally damaged.
    /// Recovery is a full rebuild; the index is never silently served as empty.
    #[error("Index corrupted: {message}. Delete the index database and run a full rebuild.")]
    Corruption { message: String },

    /// The index was built with a different embedding provider than the one
    /// now in use
    #[error("Index was built with provider '{indexed}' but current provider is '{current}'")]
    ProviderMismatch { indexed: String, current: String },
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn embedding(path: impl Into<String>, source: EmbedError) -> Self {
        Self::Embedding {
            path: path.into(),
            source,
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}
