//! Vault filesystem scanning.
//!
//! Walks the vault directory and yields note files, skipping hidden
//! files/directories, gitignored paths, and any explicitly excluded folders.

use crate::error::{IndexError, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// File extensions treated as notes.
const NOTE_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// A note file found on disk, not yet read or hashed.
#[derive(Debug, Clone)]
pub struct ScannedNote {
    /// Path relative to the vault root, forward-slash separated. This is the
    /// note's stable identity in the index.
    pub relative_path: String,
    /// Absolute path for reading the file.
    pub absolute_path: PathBuf,
    /// Modification time, unix seconds.
    pub mtime: i64,
    /// File size in bytes.
    pub size: u64,
}

/// Scan the vault for note files.
///
/// `excluded` entries are folder names (or relative paths) pruned from the
/// walk, e.g. `["templates", "archive/old"]`. Unreadable entries are logged
/// and skipped rather than failing the scan.
pub fn scan_vault(vault_root: &Path, excluded: &[String]) -> Result<Vec<ScannedNote>> {
    if !vault_root.is_dir() {
        return Err(IndexError::io(
            vault_root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "vault root is not a directory"),
        ));
    }

    let root = vault_root.to_path_buf();
    let excluded = excluded.to_vec();
    let walker = WalkBuilder::new(vault_root)
        .hidden(true)
        .git_ignore(true)
        .filter_entry(move |entry| {
            let Ok(rel) = entry.path().strip_prefix(&root) else {
                return true;
            };
            let rel_str = normalize_path(rel);
            !excluded
                .iter()
                .any(|ex| rel_str == *ex || rel.file_name().is_some_and(|n| n == ex.as_str()))
        })
        .build();

    let mut notes = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Skipping unreadable entry during vault scan: {err}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let is_note = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| NOTE_EXTENSIONS.contains(&e.to_lowercase().as_str()));
        if !is_note {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!("Skipping {}: cannot stat: {err}", path.display());
                continue;
            }
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let rel = path
            .strip_prefix(vault_root)
            .unwrap_or(path);
        notes.push(ScannedNote {
            relative_path: normalize_path(rel),
            absolute_path: path.to_path_buf(),
            mtime,
            size: metadata.len(),
        });
    }

    notes.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    tracing::debug!("Vault scan found {} notes", notes.len());
    Ok(notes)
}

/// Relative paths are stored forward-slash separated regardless of platform.
fn normalize_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
