//! Semantic search over the note index.
//!
//! Queries are embedded with the same provider the index was built with,
//! matched against stored chunk vectors, and returned as citations that name
//! the note, its heading path, and an excerpt. Excerpts are re-sliced from
//! the live file when it still matches the indexed fingerprint; otherwise the
//! stored chunk text is served and the citation is flagged stale.

use crate::error::{IndexError, Result};
use crate::retrieval::fingerprint::fingerprint_text;
use crate::retrieval::note_index::{NoteIndex, StoredChunk};
use itertools::Itertools;
use std::path::PathBuf;
use std::sync::Arc;
use vault_ai_embed::EmbeddingProvider;

/// Over-fetch factor applied before score filtering and dedupe.
const FETCH_FACTOR: usize = 4;

/// How to treat multiple matching chunks from the same note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupeMode {
    /// Keep only the best-scoring chunk per note. Right for citation lists
    /// shown to a person.
    #[default]
    BestPerNote,
    /// Keep every matching chunk. Right for assembling context windows.
    AllChunks,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    /// Results scoring below this are dropped.
    pub min_score: f32,
    pub dedupe: DedupeMode,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: 0.0,
            dedupe: DedupeMode::BestPerNote,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_dedupe(mut self, dedupe: DedupeMode) -> Self {
        self.dedupe = dedupe;
        self
    }
}

/// One search result, attributable back to its source note and section.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Citation {
    pub note_path: String,
    pub heading_path: Vec<String>,
    pub excerpt: String,
    pub score: f32,
    /// True when the note changed on disk after indexing; the excerpt then
    /// comes from the index, not the current file.
    pub stale: bool,
}

/// Searches the index and produces citations.
pub struct Retriever {
    vault_root: PathBuf,
    index: NoteIndex,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(
        vault_root: impl Into<PathBuf>,
        index: NoteIndex,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            vault_root: vault_root.into(),
            index,
            provider,
        }
    }

    /// Compare the current provider against the one recorded at index time.
    /// A mismatch means scores are not meaningful until a full rebuild.
    pub async fn check_provider(&self) -> Result<()> {
        let current = self.provider.provider_id();
        match self.index.recorded_provider().await? {
            Some(indexed) if indexed != current => {
                Err(IndexError::ProviderMismatch { indexed, current })
            }
            _ => Ok(()),
        }
    }

    /// Search the index. An empty vec means "nothing matched"; errors mean
    /// the search itself failed.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Citation>> {
        match self.check_provider().await {
            // Recoverable: results may be degraded but are still served.
            Err(IndexError::ProviderMismatch { indexed, current }) => tracing::warn!(
                "Index was built with provider '{indexed}' but querying with '{current}'; \
                 scores may be meaningless until a full rebuild"
            ),
            Err(other) => return Err(other),
            Ok(()) => {}
        }

        let query_vec = self
            .provider
            .embed_text(query)
            .await
            .map_err(|e| IndexError::embedding("<query>", e))?;

        let fetch = options.limit.saturating_mul(FETCH_FACTOR).max(options.limit);
        let matches = self.index.query(&query_vec, fetch).await?;

        let filtered = matches
            .into_iter()
            .filter(|(_, score)| *score >= options.min_score);

        let kept: Vec<(StoredChunk, f32)> = match options.dedupe {
            // query() returns best-first, so unique_by keeps the top chunk
            // per note.
            DedupeMode::BestPerNote => filtered
                .unique_by(|(chunk, _)| chunk.note_path.clone())
                .collect(),
            DedupeMode::AllChunks => filtered.collect(),
        };

        let mut citations = Vec::with_capacity(options.limit.min(kept.len()));
        for (chunk, score) in kept.into_iter().take(options.limit) {
            let (excerpt, stale) = self.excerpt_for(&chunk).await;
            citations.push(Citation {
                note_path: chunk.note_path,
                heading_path: chunk.heading_path,
                excerpt,
                score,
                stale,
            });
        }
        Ok(citations)
    }

    /// Slice the excerpt out of the live file when it still matches the
    /// indexed fingerprint; fall back to the stored chunk text otherwise.
    async fn excerpt_for(&self, chunk: &StoredChunk) -> (String, bool) {
        let path = self.vault_root.join(&chunk.note_path);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) if fingerprint_text(&text) == chunk.fingerprint => {
                // Offsets were computed against this exact content.
                match text.get(chunk.byte_start..chunk.byte_end) {
                    Some(slice) => (slice.to_string(), false),
                    None => (chunk.content.clone(), true),
                }
            }
            Ok(_) => {
                tracing::debug!("{} changed since indexing, serving stored excerpt", chunk.note_path);
                (chunk.content.clone(), true)
            }
            Err(err) => {
                tracing::debug!("Cannot read {}: {err}; serving stored excerpt", chunk.note_path);
                (chunk.content.clone(), true)
            }
        }
    }
}
