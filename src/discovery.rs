//! File discovery
//!
//! Walks a root directory and yields relative, forward-slash-normalized paths
//! of regular files, sorted. Directories never get fingerprints; symlinks are
//! not followed.

use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

/// List every regular file under `root`, relative to it.
///
/// Unreadable directory entries are skipped rather than aborting the walk;
/// `on_skip` is called with each skipped entry's error.
pub fn discover(root: &Path, mut on_skip: impl FnMut(&walkdir::Error)) -> Result<Vec<String>> {
    if !root.is_dir() {
        anyhow::bail!("not a directory: {}", root.display());
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                on_skip(&e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("path escaped root: {}", entry.path().display()))?;
        files.push(normalize(rel));
    }

    files.sort();
    Ok(files)
}

/// Relative path as stored in snapshots and the database
fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
