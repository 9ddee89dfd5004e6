//! Snapshot building and diffing
//!
//! A snapshot is the full path → digest mapping for one run. It is always
//! rebuilt from scratch (the tree may have arbitrary new or removed files)
//! and never patched. Diffing two snapshots classifies every path as added,
//! removed, changed, or unchanged.

use crate::error::FileReadError;
use crate::hasher;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Ordered path → digest mapping for one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(path.into(), digest.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate records in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }

    /// Paths in this snapshot, sorted
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl FromIterator<(String, String)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Classification of paths between a prior and a fresh snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    /// In fresh but not in prior
    pub added: Vec<String>,
    /// In prior but not in fresh
    pub removed: Vec<String>,
    /// In both with differing digests
    pub changed: Vec<String>,
    /// In both with equal digests
    pub unchanged: Vec<String>,
}

impl Diff {
    /// Classify every path present in either snapshot.
    ///
    /// All four sets come out sorted because snapshots iterate in path order.
    pub fn between(prior: &Snapshot, fresh: &Snapshot) -> Self {
        let mut diff = Self::default();

        for (path, digest) in fresh.iter() {
            match prior.get(path) {
                None => diff.added.push(path.to_string()),
                Some(old) if old == digest => diff.unchanged.push(path.to_string()),
                Some(_) => diff.changed.push(path.to_string()),
            }
        }

        for (path, _) in prior.iter() {
            if !fresh.contains(path) {
                diff.removed.push(path.to_string());
            }
        }

        diff
    }

    /// True when nothing was added, removed, or changed
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Outcome of hashing one tree
#[derive(Debug)]
pub struct SnapshotBuild {
    pub snapshot: Snapshot,
    pub errors: Vec<FileReadError>,
    /// Bytes fed to the hasher across all successfully hashed files
    pub bytes_hashed: u64,
}

/// Hash every discovered file and assemble a fresh snapshot.
///
/// `rel_paths` are paths relative to `root` (as produced by discovery).
/// Hashing runs on a rayon pool bounded by `jobs` when given; results are
/// merged into the ordered map after the parallel phase, so no shared map is
/// mutated concurrently. Per-file failures are collected, not thrown; failed
/// paths are simply absent from the returned snapshot (the reconciler decides
/// whether to retain their prior digest) and contribute nothing to the byte
/// count.
pub fn build_snapshot(
    root: &Path,
    rel_paths: &[String],
    jobs: Option<usize>,
    progress: Option<&ProgressBar>,
) -> SnapshotBuild {
    let hash_all = || -> Vec<Result<(String, String, u64), FileReadError>> {
        rel_paths
            .par_iter()
            .map(|rel| {
                let result = hasher::hash_file(&root.join(rel), rel)
                    .map(|(digest, bytes)| (rel.clone(), digest, bytes));
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                result
            })
            .collect()
    };

    let results = match jobs {
        Some(n) if n > 0 => {
            match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => pool.install(hash_all),
                // Fall back to the global pool if a bounded one can't be built
                Err(_) => hash_all(),
            }
        }
        _ => hash_all(),
    };

    let mut snapshot = Snapshot::new();
    let mut errors = Vec::new();
    let mut bytes_hashed = 0u64;

    for result in results {
        match result {
            Ok((path, digest, bytes)) => {
                snapshot.insert(path, digest);
                bytes_hashed += bytes;
            }
            Err(e) => errors.push(e),
        }
    }

    errors.sort_by(|a, b| a.path.cmp(&b.path));
    SnapshotBuild {
        snapshot,
        errors,
        bytes_hashed,
    }
}
