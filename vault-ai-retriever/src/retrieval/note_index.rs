//! SQLite-backed vector index for note chunks.
//!
//! One database holds three tables:
//!
//! ```sql
//! -- Notes table: doubles as the index manifest
//! CREATE TABLE notes (
//!     path TEXT PRIMARY KEY,           -- relative path, forward-slash
//!     fingerprint BLOB NOT NULL,       -- blake3 hash (32 bytes)
//!     mtime INTEGER NOT NULL,          -- unix seconds
//!     size INTEGER NOT NULL,
//!     indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! -- Chunks table: one row per chunk, embedding inline as an f16 blob
//! CREATE TABLE chunks (
//!     note_path TEXT NOT NULL,
//!     sequence INTEGER NOT NULL,
//!     heading_path TEXT NOT NULL,      -- JSON array of header titles
//!     byte_start INTEGER NOT NULL,
//!     byte_end INTEGER NOT NULL,
//!     content TEXT NOT NULL,
//!     embedding BLOB NOT NULL,         -- f16 vector
//!     fingerprint BLOB NOT NULL,       -- note fingerprint at embedding time
//!     PRIMARY KEY (note_path, sequence)
//! );
//!
//! -- Key/value metadata: embedding provider identity and dimension
//! CREATE TABLE index_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
//! ```
//!
//! All writes for one note go through a single transaction
//! ([`NoteIndex::replace_note_chunks`]), so readers see a note either fully
//! indexed or not at all, and a note that shrinks can never leave stale
//! chunk rows behind.

use crate::error::{IndexError, Result};
use crate::retrieval::fingerprint::{Fingerprint, ManifestEntry};
use half::f16;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

/// A chunk ready to be stored: chunker output plus its embedding.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub sequence: usize,
    pub heading_path: Vec<String>,
    pub byte_start: usize,
    pub byte_end: usize,
    pub content: String,
    pub embedding: Vec<f16>,
}

/// A chunk as read back from the index.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub note_path: String,
    pub sequence: usize,
    pub heading_path: Vec<String>,
    pub byte_start: usize,
    pub byte_end: usize,
    pub content: String,
    pub embedding: Vec<f16>,
    /// Note fingerprint at the time this chunk was embedded.
    pub fingerprint: Fingerprint,
    /// Owning note's mtime, used as a ranking tie-break.
    pub note_mtime: i64,
}

/// Counts reported by the CLI `stats` subcommand.
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub notes: usize,
    pub chunks: usize,
}

const META_PROVIDER: &str = "embedding_provider";
const META_DIMENSION: &str = "embedding_dimension";

/// SQLite-backed store for notes, chunks, and embeddings.
#[derive(Clone, Debug)]
pub struct NoteIndex {
    pool: SqlitePool,
}

impl NoteIndex {
    /// Open (or create) the index database at `db_path`.
    ///
    /// An existing database that cannot be opened or whose schema cannot be
    /// verified is reported as [`IndexError::Corruption`] rather than being
    /// treated as empty.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let existed = db_path.exists();
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await
        .map_err(|e| {
            if existed {
                IndexError::corruption(format!("cannot open {}: {e}", db_path.display()))
            } else {
                IndexError::from(e)
            }
        })?;
        Self::new_with_pool(pool, existed).await
    }

    /// In-memory index for tests.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::new_with_pool(pool, false).await
    }

    async fn new_with_pool(pool: SqlitePool, existed: bool) -> Result<Self> {
        match Self::create_tables(&pool).await {
            Ok(()) => Ok(Self { pool }),
            Err(e) if existed => Err(IndexError::corruption(format!(
                "schema verification failed: {e}"
            ))),
            Err(e) => Err(e),
        }
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                path TEXT PRIMARY KEY,
                fingerprint BLOB NOT NULL,
                mtime INTEGER NOT NULL,
                size INTEGER NOT NULL,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                note_path TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                heading_path TEXT NOT NULL,
                byte_start INTEGER NOT NULL,
                byte_end INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                fingerprint BLOB NOT NULL,
                PRIMARY KEY (note_path, sequence)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_note ON chunks(note_path)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Atomically replace everything stored for one note.
    ///
    /// Upserts the manifest row and swaps the chunk set in one transaction.
    /// This is the per-note critical section: a concurrent reader sees either
    /// the previous chunk set or the new one, never a mix, and chunks beyond
    /// the new count cannot survive.
    pub async fn replace_note_chunks(
        &self,
        path: &str,
        fingerprint: &Fingerprint,
        mtime: i64,
        size: u64,
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO notes (path, fingerprint, mtime, size, indexed_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            ON CONFLICT(path) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                mtime = excluded.mtime,
                size = excluded.size,
                indexed_at = datetime('now')
            "#,
        )
        .bind(path)
        .bind(&fingerprint[..])
        .bind(mtime)
        .bind(size as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE note_path = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            let heading_json = serde_json::to_string(&chunk.heading_path)
                .map_err(|e| IndexError::corruption(format!("heading path encode: {e}")))?;
            let embedding_bytes = bytemuck::cast_slice::<f16, u8>(&chunk.embedding);

            sqlx::query(
                r#"
                INSERT INTO chunks
                    (note_path, sequence, heading_path, byte_start, byte_end,
                     content, embedding, fingerprint)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(path)
            .bind(chunk.sequence as i64)
            .bind(heading_json)
            .bind(chunk.byte_start as i64)
            .bind(chunk.byte_end as i64)
            .bind(&chunk.content)
            .bind(embedding_bytes)
            .bind(&fingerprint[..])
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove a note and all its chunks. Returns whether the note existed.
    pub async fn delete_note(&self, path: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE note_path = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM notes WHERE path = ?1")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load the manifest: every indexed note's fingerprint, mtime, and size.
    pub async fn manifest(&self) -> Result<HashMap<String, ManifestEntry>> {
        let rows = sqlx::query("SELECT path, fingerprint, mtime, size FROM notes")
            .fetch_all(&self.pool)
            .await?;

        let mut manifest = HashMap::with_capacity(rows.len());
        for row in rows {
            let path: String = row.get("path");
            let fingerprint_bytes: Vec<u8> = row.get("fingerprint");
            let mtime: i64 = row.get("mtime");
            let size: i64 = row.get("size");

            let fingerprint = decode_fingerprint(&fingerprint_bytes, &path)?;
            manifest.insert(
                path,
                ManifestEntry {
                    fingerprint,
                    mtime,
                    size: size as u64,
                },
            );
        }
        Ok(manifest)
    }

    /// Nearest chunks to `query` by cosine similarity, highest first.
    ///
    /// Embeddings are stored L2-normalized so cosine reduces to a dot
    /// product. Ties are broken by most recent note mtime, then lexical
    /// path, then sequence, so an unchanged index always returns the same
    /// order for the same query.
    pub async fn query(&self, query: &[f16], k: usize) -> Result<Vec<(StoredChunk, f32)>> {
        let rows = sqlx::query(
            r#"
            SELECT c.note_path, c.sequence, c.heading_path, c.byte_start, c.byte_end,
                   c.content, c.embedding, c.fingerprint, n.mtime AS note_mtime
            FROM chunks c JOIN notes n ON n.path = c.note_path
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let chunk = stored_chunk_from_row(&row)?;
            if chunk.embedding.len() != query.len() {
                tracing::warn!(
                    "Skipping {}#{}: embedding dimension {} does not match query {}",
                    chunk.note_path,
                    chunk.sequence,
                    chunk.embedding.len(),
                    query.len()
                );
                continue;
            }
            let score: f32 = query
                .iter()
                .zip(chunk.embedding.iter())
                .map(|(a, b)| a.to_f32() * b.to_f32())
                .sum();
            scored.push((chunk, score));
        }

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.note_mtime.cmp(&a.note_mtime))
                .then_with(|| a.note_path.cmp(&b.note_path))
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Drop every note, chunk, and metadata row. Used by full rebuilds.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM notes").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_meta").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Record the embedding provider identity and dimension used to build
    /// this index.
    pub async fn record_provider(&self, provider_id: &str, dimension: usize) -> Result<()> {
        for (key, value) in [
            (META_PROVIDER, provider_id.to_string()),
            (META_DIMENSION, dimension.to_string()),
        ] {
            sqlx::query(
                r#"
                INSERT INTO index_meta (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// The provider identity recorded at index time, if any.
    pub async fn recorded_provider(&self) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM index_meta WHERE key = ?1")
            .bind(META_PROVIDER)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let notes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(IndexStats {
            notes: notes as usize,
            chunks: chunks as usize,
        })
    }

    /// All chunks for one note in sequence order. Used by tests and the
    /// stale-excerpt check.
    pub async fn note_chunks(&self, path: &str) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.note_path, c.sequence, c.heading_path, c.byte_start, c.byte_end,
                   c.content, c.embedding, c.fingerprint, n.mtime AS note_mtime
            FROM chunks c JOIN notes n ON n.path = c.note_path
            WHERE c.note_path = ?1
            ORDER BY c.sequence
            "#,
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_chunk_from_row).collect()
    }
}

fn stored_chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredChunk> {
    let note_path: String = row.get("note_path");
    let sequence: i64 = row.get("sequence");
    let heading_json: String = row.get("heading_path");
    let byte_start: i64 = row.get("byte_start");
    let byte_end: i64 = row.get("byte_end");
    let content: String = row.get("content");
    let embedding_bytes: Vec<u8> = row.get("embedding");
    let fingerprint_bytes: Vec<u8> = row.get("fingerprint");
    let note_mtime: i64 = row.get("note_mtime");

    let heading_path: Vec<String> = serde_json::from_str(&heading_json)
        .map_err(|e| IndexError::corruption(format!("heading path for {note_path}: {e}")))?;
    let fingerprint = decode_fingerprint(&fingerprint_bytes, &note_path)?;
    if embedding_bytes.len() % 2 != 0 {
        return Err(IndexError::corruption(format!(
            "odd embedding blob length for {note_path}"
        )));
    }
    let embedding = bytemuck::cast_slice::<u8, f16>(&embedding_bytes).to_vec();

    Ok(StoredChunk {
        note_path,
        sequence: sequence as usize,
        heading_path,
        byte_start: byte_start as usize,
        byte_end: byte_end as usize,
        content,
        embedding,
        fingerprint,
        note_mtime,
    })
}

fn decode_fingerprint(bytes: &[u8], path: &str) -> Result<Fingerprint> {
    bytes.try_into().map_err(|_| {
        IndexError::corruption(format!(
            "fingerprint for {path} is {} bytes, expected 32 (hex: {})",
            bytes.len(),
            hex::encode(bytes)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::fingerprint::fingerprint_text;

    fn unit_vec(dim: usize, hot: usize) -> Vec<f16> {
        (0..dim)
            .map(|i| f16::from_f32(if i == hot { 1.0 } else { 0.0 }))
            .collect()
    }

    fn chunk(seq: usize, heading: &[&str], text: &str, hot: usize) -> EmbeddedChunk {
        EmbeddedChunk {
            sequence: seq,
            heading_path: heading.iter().map(|s| s.to_string()).collect(),
            byte_start: 0,
            byte_end: text.len(),
            content: text.to_string(),
            embedding: unit_vec(4, hot),
        }
    }

    #[tokio::test]
    async fn replace_then_shrink_leaves_no_orphans() {
        let index = NoteIndex::open_memory().await.unwrap();
        let fp1 = fingerprint_text("v1");
        index
            .replace_note_chunks(
                "note.md",
                &fp1,
                100,
                10,
                &[
                    chunk(0, &["A"], "one", 0),
                    chunk(1, &["A"], "two", 1),
                    chunk(2, &["A"], "three", 2),
                ],
            )
            .await
            .unwrap();
        assert_eq!(index.note_chunks("note.md").await.unwrap().len(), 3);

        let fp2 = fingerprint_text("v2");
        index
            .replace_note_chunks("note.md", &fp2, 200, 5, &[chunk(0, &["A"], "only", 3)])
            .await
            .unwrap();

        let remaining = index.note_chunks("note.md").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "only");
        assert_eq!(remaining[0].fingerprint, fp2);
    }

    #[tokio::test]
    async fn delete_note_removes_manifest_and_chunks() {
        let index = NoteIndex::open_memory().await.unwrap();
        let fp = fingerprint_text("x");
        index
            .replace_note_chunks("gone.md", &fp, 1, 1, &[chunk(0, &[], "x", 0)])
            .await
            .unwrap();

        assert!(index.delete_note("gone.md").await.unwrap());
        assert!(index.manifest().await.unwrap().is_empty());
        assert!(index.note_chunks("gone.md").await.unwrap().is_empty());
        assert!(!index.delete_note("gone.md").await.unwrap());
    }

    #[tokio::test]
    async fn query_ranks_by_similarity_with_deterministic_ties() {
        let index = NoteIndex::open_memory().await.unwrap();
        let fp = fingerprint_text("a");
        index
            .replace_note_chunks("b.md", &fp, 100, 1, &[chunk(0, &[], "match b", 0)])
            .await
            .unwrap();
        index
            .replace_note_chunks("a.md", &fp, 100, 1, &[chunk(0, &[], "match a", 0)])
            .await
            .unwrap();
        index
            .replace_note_chunks("c.md", &fp, 100, 1, &[chunk(0, &[], "miss", 1)])
            .await
            .unwrap();

        let results = index.query(&unit_vec(4, 0), 10).await.unwrap();
        assert_eq!(results.len(), 3);
        // Equal scores and mtimes: lexical path order.
        assert_eq!(results[0].0.note_path, "a.md");
        assert_eq!(results[1].0.note_path, "b.md");
        assert_eq!(results[2].0.note_path, "c.md");
        assert!(results[0].1 > results[2].1);

        let again = index.query(&unit_vec(4, 0), 10).await.unwrap();
        let order: Vec<_> = again.iter().map(|(c, s)| (c.note_path.clone(), *s)).collect();
        let first: Vec<_> = results.iter().map(|(c, s)| (c.note_path.clone(), *s)).collect();
        assert_eq!(order, first);
    }

    #[tokio::test]
    async fn newer_note_wins_score_ties() {
        let index = NoteIndex::open_memory().await.unwrap();
        let fp = fingerprint_text("a");
        index
            .replace_note_chunks("old.md", &fp, 100, 1, &[chunk(0, &[], "x", 0)])
            .await
            .unwrap();
        index
            .replace_note_chunks("new.md", &fp, 200, 1, &[chunk(0, &[], "x", 0)])
            .await
            .unwrap();

        let results = index.query(&unit_vec(4, 0), 2).await.unwrap();
        assert_eq!(results[0].0.note_path, "new.md");
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let index = NoteIndex::open_memory().await.unwrap();
        let fp = fingerprint_text("a");
        index
            .replace_note_chunks("n.md", &fp, 1, 1, &[chunk(0, &[], "x", 0)])
            .await
            .unwrap();
        index.record_provider("hash:hash-v1:4", 4).await.unwrap();

        index.clear().await.unwrap();
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.notes, 0);
        assert_eq!(stats.chunks, 0);
        assert_eq!(index.recorded_provider().await.unwrap(), None);
    }

    #[tokio::test]
    async fn provider_metadata_round_trips() {
        let index = NoteIndex::open_memory().await.unwrap();
        assert_eq!(index.recorded_provider().await.unwrap(), None);
        index.record_provider("hash:hash-v1:256", 256).await.unwrap();
        assert_eq!(
            index.recorded_provider().await.unwrap(),
            Some("hash:hash-v1:256".to_string())
        );
        // Re-recording overwrites.
        index.record_provider("fastembed:mini:384", 384).await.unwrap();
        assert_eq!(
            index.recorded_provider().await.unwrap(),
            Some("fastembed:mini:384".to_string())
        );
    }

    #[tokio::test]
    async fn heading_paths_survive_storage() {
        let index = NoteIndex::open_memory().await.unwrap();
        let fp = fingerprint_text("a");
        index
            .replace_note_chunks(
                "n.md",
                &fp,
                1,
                1,
                &[chunk(0, &["A", "B"], "nested", 0)],
            )
            .await
            .unwrap();

        let chunks = index.note_chunks("n.md").await.unwrap();
        assert_eq!(chunks[0].heading_path, vec!["A".to_string(), "B".to_string()]);
    }
}
