//! End-to-end tests for the index/search pipeline over a real vault directory.
//!
//! These cover the behaviors the pipeline promises as a whole:
//! - repeat builds of an unchanged vault are no-ops with identical stored state
//! - incremental builds converge to the same index as a full rebuild
//! - shrinking a note leaves no orphaned chunks
//! - deleted notes disappear from the index and from search results
//! - search ranking is deterministic for an unchanged index
//! - citations carry the heading path the content actually lives under
//! - one failing note never blocks its siblings and is retried next build

use anyhow::Result;
use async_trait::async_trait;
use half::f16;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;
use vault_ai_embed::{
    EmbedError, EmbeddingProvider, EmbeddingResult, HashEmbedProvider,
};
use vault_ai_retriever::retrieval::{
    BuildMode, DedupeMode, Indexer, IndexerConfig, NoteIndex, Retriever, SearchOptions,
};

const DIM: usize = 128;

fn provider() -> Arc<HashEmbedProvider> {
    Arc::new(HashEmbedProvider::with_dimension(DIM))
}

async fn build(vault: &Path, index: &NoteIndex, mode: BuildMode) -> Result<vault_ai_retriever::retrieval::IndexReport> {
    let indexer = Indexer::new(IndexerConfig::new(vault), index.clone(), provider());
    Ok(indexer.build(mode).await?)
}

/// Stored (path, sequence, content, fingerprint) tuples for comparing whole
/// index states.
async fn snapshot(index: &NoteIndex) -> Result<Vec<(String, usize, String, [u8; 32])>> {
    let mut rows = Vec::new();
    let mut paths: Vec<String> = index.manifest().await?.into_keys().collect();
    paths.sort();
    for path in paths {
        for chunk in index.note_chunks(&path).await? {
            rows.push((chunk.note_path, chunk.sequence, chunk.content, chunk.fingerprint));
        }
    }
    Ok(rows)
}

#[tokio::test]
async fn repeat_builds_are_idempotent() -> Result<()> {
    let vault = tempdir()?;
    fs::write(vault.path().join("a.md"), "# Alpha\n\nfirst note body\n")?;
    fs::write(vault.path().join("b.md"), "# Beta\n\nsecond note body\n")?;

    let index = NoteIndex::open_memory().await?;
    build(vault.path(), &index, BuildMode::Full).await?;
    let first = snapshot(&index).await?;

    let report = build(vault.path(), &index, BuildMode::Incremental).await?;
    assert_eq!(report.added + report.changed + report.deleted, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(snapshot(&index).await?, first);
    Ok(())
}

#[tokio::test]
async fn shrinking_a_note_leaves_no_orphan_chunks() -> Result<()> {
    let vault = tempdir()?;
    let note = vault.path().join("shrink.md");
    // Three sections, min_chunk_chars=0 so each is its own chunk.
    fs::write(
        &note,
        "# One\n\nfirst section body text\n\n# Two\n\nsecond section body text\n\n# Three\n\nthird section body text\n",
    )?;

    let index = NoteIndex::open_memory().await?;
    let config = IndexerConfig::new(vault.path())
        .with_chunker(vault_ai_chunk::ChunkerConfig::new(2000, 0));
    Indexer::new(config.clone(), index.clone(), provider())
        .build(BuildMode::Full)
        .await?;
    assert_eq!(index.note_chunks("shrink.md").await?.len(), 3);

    fs::write(&note, "# Only\n\njust one section now\n")?;
    let report = Indexer::new(config.clone(), index.clone(), provider())
        .build(BuildMode::Incremental)
        .await?;
    assert_eq!(report.changed, 1);

    let chunks = index.note_chunks("shrink.md").await?;
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content.contains("just one section"));

    // Incremental result is indistinguishable from a full rebuild.
    let incremental = snapshot(&index).await?;
    let fresh = NoteIndex::open_memory().await?;
    Indexer::new(config, fresh.clone(), provider())
        .build(BuildMode::Full)
        .await?;
    assert_eq!(incremental, snapshot(&fresh).await?);
    Ok(())
}

#[tokio::test]
async fn deleted_note_disappears_from_index_and_search() -> Result<()> {
    let vault = tempdir()?;
    let doomed = vault.path().join("doomed.md");
    fs::write(&doomed, "# Doomed\n\nvery distinctive phrase xyzzy\n")?;
    fs::write(vault.path().join("keeper.md"), "# Keeper\n\nordinary words\n")?;

    let index = NoteIndex::open_memory().await?;
    build(vault.path(), &index, BuildMode::Full).await?;

    let retriever = Retriever::new(vault.path(), index.clone(), provider());
    let before = retriever
        .search("distinctive phrase xyzzy", &SearchOptions::default())
        .await?;
    assert_eq!(before[0].note_path, "doomed.md");

    fs::remove_file(&doomed)?;
    let report = build(vault.path(), &index, BuildMode::Incremental).await?;
    assert_eq!(report.deleted, 1);

    assert!(!index.manifest().await?.contains_key("doomed.md"));
    let after = retriever
        .search("distinctive phrase xyzzy", &SearchOptions::default())
        .await?;
    assert!(after.iter().all(|c| c.note_path != "doomed.md"));
    Ok(())
}

#[tokio::test]
async fn search_is_deterministic_on_an_unchanged_index() -> Result<()> {
    let vault = tempdir()?;
    for i in 0..6 {
        fs::write(
            vault.path().join(format!("note{i}.md")),
            format!("# Note {i}\n\nshared topic words plus variant {i}\n"),
        )?;
    }

    let index = NoteIndex::open_memory().await?;
    build(vault.path(), &index, BuildMode::Full).await?;
    let retriever = Retriever::new(vault.path(), index, provider());

    let options = SearchOptions::default().with_dedupe(DedupeMode::AllChunks);
    let first = retriever.search("shared topic words", &options).await?;
    assert!(!first.is_empty());
    for _ in 0..3 {
        let again = retriever.search("shared topic words", &options).await?;
        let a: Vec<_> = first.iter().map(|c| (&c.note_path, c.score)).collect();
        let b: Vec<_> = again.iter().map(|c| (&c.note_path, c.score)).collect();
        assert_eq!(a, b);
    }
    Ok(())
}

#[tokio::test]
async fn citations_carry_the_owning_heading_path() -> Result<()> {
    let vault = tempdir()?;
    fs::write(
        vault.path().join("deep.md"),
        "# A\n\nunrelated intro paragraph about nothing in particular\n\n\
         ## B\n\nthe zorbulating flux capacitor needs recalibration\n",
    )?;

    let index = NoteIndex::open_memory().await?;
    let config = IndexerConfig::new(vault.path())
        .with_chunker(vault_ai_chunk::ChunkerConfig::new(2000, 0));
    Indexer::new(config, index.clone(), provider())
        .build(BuildMode::Full)
        .await?;

    let retriever = Retriever::new(vault.path(), index, provider());
    let citations = retriever
        .search(
            "zorbulating flux capacitor recalibration",
            &SearchOptions::default().with_dedupe(DedupeMode::AllChunks),
        )
        .await?;

    let top = &citations[0];
    assert_eq!(top.note_path, "deep.md");
    assert_eq!(top.heading_path, vec!["A".to_string(), "B".to_string()]);
    assert!(top.excerpt.contains("zorbulating"));
    assert!(!top.stale);
    Ok(())
}

/// Provider that fails every text containing a marker. Failures are permanent
/// (non-transient) so tests don't sit in retry backoff.
struct FailingProvider {
    inner: HashEmbedProvider,
    marker: String,
    calls: AtomicUsize,
}

impl FailingProvider {
    fn new(marker: &str) -> Self {
        Self {
            inner: HashEmbedProvider::with_dimension(DIM),
            marker: marker.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed_text(&self, text: &str) -> vault_ai_embed::Result<Vec<f16>> {
        self.inner.embed_text(text).await
    }

    async fn embed_texts(&self, texts: &[String]) -> vault_ai_embed::Result<EmbeddingResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains(&self.marker)) {
            return Err(EmbedError::invalid_config("simulated provider outage"));
        }
        self.inner.embed_texts(texts).await
    }

    fn embedding_dimension(&self) -> usize {
        self.inner.embedding_dimension()
    }

    fn provider_id(&self) -> String {
        self.inner.provider_id()
    }
}

#[tokio::test]
async fn failing_note_is_isolated_and_retried_next_build() -> Result<()> {
    let vault = tempdir()?;
    fs::write(vault.path().join("good.md"), "# Good\n\nhealthy content\n")?;
    fs::write(vault.path().join("bad.md"), "# Bad\n\nPOISON content\n")?;

    let index = NoteIndex::open_memory().await?;
    let failing = Arc::new(FailingProvider::new("POISON"));
    let indexer = Indexer::new(
        IndexerConfig::new(vault.path()),
        index.clone(),
        failing.clone(),
    );

    let report = indexer.build(BuildMode::Full).await?;
    assert_eq!(report.added, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "bad.md");

    // The good note is indexed; the bad one has no manifest entry.
    let manifest = index.manifest().await?;
    assert!(manifest.contains_key("good.md"));
    assert!(!manifest.contains_key("bad.md"));

    // Next build retries only the failed note.
    let report = indexer.build(BuildMode::Incremental).await?;
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors.len(), 1);

    // Once the note is fixed, it indexes cleanly.
    fs::write(vault.path().join("bad.md"), "# Bad\n\nclean content now\n")?;
    let report = indexer.build(BuildMode::Incremental).await?;
    assert!(report.errors.is_empty());
    assert_eq!(report.added + report.changed, 1);
    assert!(index.manifest().await?.contains_key("bad.md"));
    Ok(())
}

#[tokio::test]
async fn garbage_database_surfaces_corruption_not_an_empty_index() -> Result<()> {
    let db_dir = tempdir()?;
    let db_path = db_dir.path().join("index.db");
    // Non-empty file without a SQLite header.
    fs::write(&db_path, vec![0xA5u8; 4096])?;

    let err = NoteIndex::open(&db_path).await.unwrap_err();
    assert!(
        matches!(err, vault_ai_retriever::IndexError::Corruption { .. }),
        "expected Corruption, got: {err}"
    );
    Ok(())
}

#[tokio::test]
async fn index_persists_across_reopen() -> Result<()> {
    let vault = tempdir()?;
    fs::write(vault.path().join("a.md"), "# Alpha\n\npersistent content\n")?;
    let db_dir = tempdir()?;
    let db_path = db_dir.path().join("index.db");

    {
        let index = NoteIndex::open(&db_path).await?;
        build(vault.path(), &index, BuildMode::Full).await?;
    }

    let index = NoteIndex::open(&db_path).await?;
    let stats = index.stats().await?;
    assert_eq!(stats.notes, 1);

    // An incremental build against the reopened index skips everything.
    let report = build(vault.path(), &index, BuildMode::Incremental).await?;
    assert_eq!(report.skipped, 1);
    assert_eq!(report.added + report.changed, 0);
    Ok(())
}
