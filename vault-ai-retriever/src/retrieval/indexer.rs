//! Index builds: full and incremental.
//!
//! A build scans the vault, diffs it against the manifest, and processes each
//! added or changed note through chunk → embed → store. Notes are independent
//! units of work: they run on a bounded worker pool, a failing note lands in
//! the report instead of aborting the build, and cancellation between notes
//! leaves every already-committed note intact.

use crate::error::{IndexError, Result};
use crate::retrieval::fingerprint::{self, ChangeKind, PendingNote};
use crate::retrieval::note_index::{EmbeddedChunk, NoteIndex};
use crate::retrieval::scanner;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use vault_ai_chunk::{ChunkerConfig, MarkdownChunker};
use vault_ai_embed::EmbeddingProvider;

/// Whether to rebuild from scratch or only process what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Clear the index and treat every note as added.
    Full,
    /// Diff against the manifest; skip unchanged notes entirely.
    Incremental,
}

/// Outcome of one build.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub added: usize,
    pub changed: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// Per-note failures as (path, message). These notes keep their old
    /// manifest entry and are retried on the next build.
    pub errors: Vec<(String, String)>,
    /// True when the build stopped early on a cancel request. Everything
    /// counted above is committed; a later incremental build picks up the
    /// rest.
    pub cancelled: bool,
}

/// Configuration for [`Indexer`].
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub vault_root: PathBuf,
    /// Upper bound on notes processed concurrently.
    pub max_workers: usize,
    pub chunker: ChunkerConfig,
    /// Folder names or relative paths pruned from the vault scan.
    pub excluded: Vec<String>,
    /// Total embedding attempts per note, including the first.
    pub max_attempts: usize,
    /// Base delay for exponential backoff between attempts.
    pub retry_base: Duration,
}

impl IndexerConfig {
    pub fn new(vault_root: impl Into<PathBuf>) -> Self {
        Self {
            vault_root: vault_root.into(),
            max_workers: 4,
            chunker: ChunkerConfig::default(),
            excluded: Vec::new(),
            max_attempts: 3,
            retry_base: Duration::from_millis(250),
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_excluded(mut self, excluded: Vec<String>) -> Self {
        self.excluded = excluded;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }
}

/// Builds and maintains the note index for one vault.
pub struct Indexer {
    config: IndexerConfig,
    index: NoteIndex,
    provider: Arc<dyn EmbeddingProvider>,
    chunker: MarkdownChunker,
    cancel: Arc<AtomicBool>,
}

impl Indexer {
    pub fn new(config: IndexerConfig, index: NoteIndex, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let chunker = MarkdownChunker::new(config.chunker.clone());
        Self {
            config,
            index,
            provider,
            chunker,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag shared with callers that want to stop a running build. The build
    /// checks it between notes; committed notes stay committed.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn index(&self) -> &NoteIndex {
        &self.index
    }

    /// Run one build. Per-note failures are reported, not returned: `Err`
    /// means the build as a whole could not run.
    pub async fn build(&self, mode: BuildMode) -> Result<IndexReport> {
        tracing::info!(
            "Starting {:?} build of {}",
            mode,
            self.config.vault_root.display()
        );

        let scanned = scanner::scan_vault(&self.config.vault_root, &self.config.excluded)?;

        let manifest = match mode {
            BuildMode::Full => {
                self.index.clear().await?;
                Default::default()
            }
            BuildMode::Incremental => {
                // Unchanged notes keep their existing embeddings, so an
                // incremental build under a different provider would leave a
                // mixed-provider index behind a matching identity record.
                // Switching providers requires a full rebuild.
                let current = self.provider.provider_id();
                if let Some(indexed) = self.index.recorded_provider().await?
                    && indexed != current
                {
                    return Err(IndexError::ProviderMismatch { indexed, current });
                }
                self.index.manifest().await?
            }
        };
        // clear() wipes index_meta, so the provider is recorded after it.
        self.index
            .record_provider(
                &self.provider.provider_id(),
                self.provider.embedding_dimension(),
            )
            .await?;

        let diff = fingerprint::diff_vault(&manifest, &scanned).await;

        let mut report = IndexReport {
            skipped: diff.unchanged,
            errors: diff.errors,
            ..Default::default()
        };

        for path in &diff.deleted {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            if self.index.delete_note(path).await? {
                tracing::debug!("Removed deleted note {path}");
                report.deleted += 1;
            }
        }

        let outcomes: Vec<Option<std::result::Result<ChangeKind, (String, String)>>> =
            futures::stream::iter(diff.pending)
                .map(|pending| {
                    let index = self.index.clone();
                    let provider = Arc::clone(&self.provider);
                    let chunker = self.chunker.clone();
                    let cancel = Arc::clone(&self.cancel);
                    let max_attempts = self.config.max_attempts;
                    let retry_base = self.config.retry_base;
                    async move {
                        if cancel.load(Ordering::SeqCst) {
                            return None;
                        }
                        Some(
                            process_note(&index, provider.as_ref(), &chunker, &pending, max_attempts, retry_base)
                                .await,
                        )
                    }
                })
                .buffer_unordered(self.config.max_workers)
                .collect()
                .await;

        for outcome in outcomes {
            match outcome {
                None => report.cancelled = true,
                Some(Ok(ChangeKind::Added)) => report.added += 1,
                Some(Ok(ChangeKind::Changed)) => report.changed += 1,
                Some(Err((path, message))) => {
                    tracing::error!("Indexing failed for {path}: {message}");
                    report.errors.push((path, message));
                }
            }
        }
        if self.cancel.load(Ordering::SeqCst) {
            report.cancelled = true;
        }

        tracing::info!(
            "Build finished: {} added, {} changed, {} deleted, {} skipped, {} errors{}",
            report.added,
            report.changed,
            report.deleted,
            report.skipped,
            report.errors.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }
}

/// Chunk, embed, and store one note. Errors are returned as (path, message)
/// so the caller can fold them into the report; the manifest entry is only
/// written on success, so a failed note diffs as changed again next build.
async fn process_note(
    index: &NoteIndex,
    provider: &dyn EmbeddingProvider,
    chunker: &MarkdownChunker,
    pending: &PendingNote,
    max_attempts: usize,
    retry_base: Duration,
) -> std::result::Result<ChangeKind, (String, String)> {
    let path = &pending.note.relative_path;
    let chunks = chunker.chunk(&pending.text);
    tracing::debug!("{path}: {} chunks", chunks.len());

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let result = embed_with_retry(provider, &texts, max_attempts, retry_base)
        .await
        .map_err(|e| (path.clone(), e.to_string()))?;

    if result.embeddings.len() != chunks.len() {
        return Err((
            path.clone(),
            format!(
                "provider returned {} embeddings for {} chunks",
                result.embeddings.len(),
                chunks.len()
            ),
        ));
    }

    let embedded: Vec<EmbeddedChunk> = chunks
        .into_iter()
        .zip(result.embeddings)
        .map(|(chunk, embedding)| EmbeddedChunk {
            sequence: chunk.sequence,
            heading_path: chunk.heading_path,
            byte_start: chunk.start,
            byte_end: chunk.end,
            content: chunk.text,
            embedding,
        })
        .collect();

    index
        .replace_note_chunks(
            path,
            &pending.fingerprint,
            pending.note.mtime,
            pending.note.size,
            &embedded,
        )
        .await
        .map_err(|e| (path.clone(), e.to_string()))?;

    Ok(pending.kind)
}

async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    max_attempts: usize,
    retry_base: Duration,
) -> vault_ai_embed::Result<vault_ai_embed::EmbeddingResult> {
    let mut attempt = 0;
    loop {
        match provider.embed_texts(texts).await {
            Ok(result) => return Ok(result),
            Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                let delay = retry_base * 2u32.saturating_pow(attempt as u32);
                tracing::warn!("Embedding attempt {} failed, retrying in {delay:?}: {err}", attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
