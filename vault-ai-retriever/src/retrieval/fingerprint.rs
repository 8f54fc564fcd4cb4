//! Content fingerprinting and manifest diffing.
//!
//! The manifest maps each indexed note path to the fingerprint and mtime it
//! had when last indexed. Diffing a fresh vault scan against the manifest
//! classifies every note as added, changed, unchanged, or deleted, which is
//! what lets incremental builds skip the unchanged majority.
//!
//! Fingerprints are blake3 over file content. Matching mtime and size against
//! the manifest is only a pre-filter that skips hashing; a touched-but-
//! identical file still diffs as unchanged once hashed.

use crate::retrieval::scanner::ScannedNote;
use std::collections::HashMap;

/// blake3 content hash, the note's change-detection identity.
pub type Fingerprint = [u8; 32];

/// Manifest entry for one indexed note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestEntry {
    pub fingerprint: Fingerprint,
    pub mtime: i64,
    pub size: u64,
}

/// What the indexer should do with one note, derived from its diff state.
/// Exactly one action per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteAction {
    /// Unchanged: no chunking, no embedding, no writes.
    Skip,
    /// Added or changed: chunk, embed, and replace stored chunks.
    Index(ChangeKind),
    /// Gone from disk: remove from the index.
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Changed,
}

/// A note that needs (re)indexing, with its content already read and hashed.
#[derive(Debug, Clone)]
pub struct PendingNote {
    pub note: ScannedNote,
    pub text: String,
    pub fingerprint: Fingerprint,
    pub kind: ChangeKind,
}

/// Result of diffing a vault scan against the manifest.
#[derive(Debug, Default)]
pub struct VaultDiff {
    /// Notes to chunk and embed (added or changed).
    pub pending: Vec<PendingNote>,
    /// Manifest paths no longer present on disk.
    pub deleted: Vec<String>,
    /// Count of notes skipped as unchanged.
    pub unchanged: usize,
    /// Notes that could not be read, as (path, message) pairs.
    pub errors: Vec<(String, String)>,
}

pub fn fingerprint_text(text: &str) -> Fingerprint {
    *blake3::hash(text.as_bytes()).as_bytes()
}

/// Classify one note given its manifest state and current fingerprint.
fn classify(previous: Option<&ManifestEntry>, current: Fingerprint) -> NoteAction {
    match previous {
        None => NoteAction::Index(ChangeKind::Added),
        Some(entry) if entry.fingerprint == current => NoteAction::Skip,
        Some(_) => NoteAction::Index(ChangeKind::Changed),
    }
}

/// Diff a scan against the manifest, reading and hashing only the notes whose
/// mtime or size moved. Read failures land in `errors`, never panic the diff.
pub async fn diff_vault(
    manifest: &HashMap<String, ManifestEntry>,
    scanned: &[ScannedNote],
) -> VaultDiff {
    let mut diff = VaultDiff::default();
    let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();

    for note in scanned {
        seen.insert(note.relative_path.as_str());
        let previous = manifest.get(&note.relative_path);

        // mtime+size pre-filter: untouched file, skip the read and hash.
        if let Some(entry) = previous
            && entry.mtime == note.mtime
            && entry.size == note.size
        {
            diff.unchanged += 1;
            continue;
        }

        let text = match tokio::fs::read_to_string(&note.absolute_path).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("Cannot read {}: {err}", note.relative_path);
                diff.errors.push((note.relative_path.clone(), err.to_string()));
                continue;
            }
        };
        let fingerprint = fingerprint_text(&text);

        match classify(previous, fingerprint) {
            NoteAction::Skip => diff.unchanged += 1,
            NoteAction::Index(kind) => diff.pending.push(PendingNote {
                note: note.clone(),
                text,
                fingerprint,
                kind,
            }),
            // A scanned note is present on disk, so Remove cannot arise here.
            NoteAction::Remove => unreachable!("scanned notes are never removals"),
        }
    }

    for path in manifest.keys() {
        if !seen.contains(path.as_str()) {
            diff.deleted.push(path.clone());
        }
    }
    diff.deleted.sort();
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn scanned(root: &Path, rel: &str) -> ScannedNote {
        let abs = root.join(rel);
        let meta = fs::metadata(&abs).unwrap();
        ScannedNote {
            relative_path: rel.to_string(),
            absolute_path: abs,
            mtime: meta
                .modified()
                .unwrap()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64,
            size: meta.len(),
        }
    }

    #[test]
    fn classify_covers_all_states() {
        let fp_a = fingerprint_text("a");
        let fp_b = fingerprint_text("b");
        let entry = ManifestEntry {
            fingerprint: fp_a,
            mtime: 0,
            size: 1,
        };

        assert_eq!(classify(None, fp_a), NoteAction::Index(ChangeKind::Added));
        assert_eq!(classify(Some(&entry), fp_a), NoteAction::Skip);
        assert_eq!(
            classify(Some(&entry), fp_b),
            NoteAction::Index(ChangeKind::Changed)
        );
    }

    #[tokio::test]
    async fn new_note_is_added() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("new.md"), "# New").unwrap();
        let scan = vec![scanned(dir.path(), "new.md")];

        let diff = diff_vault(&HashMap::new(), &scan).await;
        assert_eq!(diff.pending.len(), 1);
        assert_eq!(diff.pending[0].kind, ChangeKind::Added);
        assert_eq!(diff.unchanged, 0);
        assert!(diff.deleted.is_empty());
    }

    #[tokio::test]
    async fn matching_fingerprint_is_unchanged_even_when_mtime_moved() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("same.md"), "stable content").unwrap();
        let note = scanned(dir.path(), "same.md");

        // Manifest has the right fingerprint but a stale mtime, so the
        // pre-filter misses and the hash must decide.
        let mut manifest = HashMap::new();
        manifest.insert(
            "same.md".to_string(),
            ManifestEntry {
                fingerprint: fingerprint_text("stable content"),
                mtime: note.mtime - 100,
                size: note.size,
            },
        );

        let diff = diff_vault(&manifest, &[note]).await;
        assert_eq!(diff.unchanged, 1);
        assert!(diff.pending.is_empty());
    }

    #[tokio::test]
    async fn changed_content_is_detected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("note.md"), "version two").unwrap();
        let note = scanned(dir.path(), "note.md");

        let mut manifest = HashMap::new();
        manifest.insert(
            "note.md".to_string(),
            ManifestEntry {
                fingerprint: fingerprint_text("version one"),
                mtime: note.mtime - 100,
                size: note.size,
            },
        );

        let diff = diff_vault(&manifest, &[note]).await;
        assert_eq!(diff.pending.len(), 1);
        assert_eq!(diff.pending[0].kind, ChangeKind::Changed);
    }

    #[tokio::test]
    async fn missing_note_is_deleted() {
        let mut manifest = HashMap::new();
        manifest.insert(
            "gone.md".to_string(),
            ManifestEntry {
                fingerprint: fingerprint_text("x"),
                mtime: 0,
                size: 1,
            },
        );

        let diff = diff_vault(&manifest, &[]).await;
        assert_eq!(diff.deleted, vec!["gone.md".to_string()]);
    }

    #[tokio::test]
    async fn unreadable_note_lands_in_errors() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ghost.md"), "x").unwrap();
        let mut note = scanned(dir.path(), "ghost.md");
        note.absolute_path = dir.path().join("does-not-exist.md");
        note.mtime += 1; // force past the pre-filter

        let diff = diff_vault(&HashMap::new(), &[note]).await;
        assert!(diff.pending.is_empty());
        assert_eq!(diff.errors.len(), 1);
        assert_eq!(diff.errors[0].0, "ghost.md");
    }
}
