pub mod markdown;

// Re-export the chunking entry points for external use
pub use markdown::{ChunkerConfig, MarkdownChunker, NoteChunk};
