//! Run orchestration
//!
//! One run is linear: load the prior snapshot, hash every discovered file,
//! diff, commit, and report. Per-file read errors are collected into the
//! report; store-level errors abort the run. Nothing is retried.

use crate::error::{FileReadError, StoreError};
use crate::snapshot::{self, Diff};
use crate::store::{FingerprintStore, RunStats};
use indicatif::ProgressBar;
use std::path::PathBuf;

/// Tuning knobs for one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Delete store rows for paths absent from the fresh snapshot. Off by
    /// default: the store is grow-only unless asked otherwise.
    pub prune: bool,
    /// Bound the hashing worker pool (None = one worker per core)
    pub jobs: Option<usize>,
    /// Diff only; skip the commit
    pub dry_run: bool,
}

/// Outcome of one run
#[derive(Debug)]
pub struct RunReport {
    pub diff: Diff,
    /// Files that could not be hashed; the run continued without them
    pub errors: Vec<FileReadError>,
    pub stats: RunStats,
    /// Total bytes hashed this run
    pub bytes_hashed: u64,
    /// Whether the fresh snapshot was committed
    pub committed: bool,
}

/// Owns the store for the duration of a run
pub struct Reconciler {
    root: PathBuf,
    store: FingerprintStore,
}

impl Reconciler {
    pub fn new(root: impl Into<PathBuf>, store: FingerprintStore) -> Self {
        Self {
            root: root.into(),
            store,
        }
    }

    /// Hash `rel_paths`, diff against the prior snapshot, and commit.
    ///
    /// A file that fails to hash keeps its prior digest (when one exists) so
    /// it is reported as unchanged rather than falsely removed; the read
    /// error is surfaced in the report either way.
    pub fn run(
        &mut self,
        rel_paths: &[String],
        options: &RunOptions,
        progress: Option<&ProgressBar>,
    ) -> Result<RunReport, StoreError> {
        let run_id = if options.dry_run {
            None
        } else {
            Some(self.store.begin_run()?)
        };

        let prior = self.store.load()?;
        let build = snapshot::build_snapshot(&self.root, rel_paths, options.jobs, progress);
        let (mut fresh, errors, bytes_hashed) =
            (build.snapshot, build.errors, build.bytes_hashed);

        for err in &errors {
            if let Some(digest) = prior.get(&err.path) {
                fresh.insert(err.path.clone(), digest.to_string());
            }
        }

        let diff = Diff::between(&prior, &fresh);
        let stats = RunStats {
            total_files: fresh.len(),
            added: diff.added.len(),
            removed: diff.removed.len(),
            changed: diff.changed.len(),
            unchanged: diff.unchanged.len(),
            read_errors: errors.len(),
        };

        let committed = if options.dry_run {
            false
        } else {
            self.store.commit(&fresh, options.prune)?;
            true
        };

        if let Some(run_id) = run_id {
            self.store.finish_run(run_id, &stats)?;
        }

        Ok(RunReport {
            diff,
            errors,
            stats,
            bytes_hashed,
            committed,
        })
    }

    pub fn store(&self) -> &FingerprintStore {
        &self.store
    }

    /// Release the store, surfacing close errors
    pub fn finish(self) -> Result<(), StoreError> {
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Reconciler) {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("tree")).unwrap();
        let store = FingerprintStore::open(&StoreConfig {
            database: temp_dir.path().join("test.db"),
            ..StoreConfig::default()
        })
        .unwrap();
        let rec = Reconciler::new(temp_dir.path().join("tree"), store);
        (temp_dir, rec)
    }

    fn write_tree(temp_dir: &TempDir, name: &str, content: &str) {
        fs::write(temp_dir.path().join("tree").join(name), content).unwrap();
    }

    #[test]
    fn test_first_run_reports_all_added() {
        let (temp_dir, mut rec) = setup();
        write_tree(&temp_dir, "a.txt", "hello");
        write_tree(&temp_dir, "b.txt", "world");

        let paths = vec!["a.txt".to_string(), "b.txt".to_string()];
        let report = rec.run(&paths, &RunOptions::default(), None).unwrap();

        assert_eq!(report.diff.added, vec!["a.txt", "b.txt"]);
        assert!(report.diff.removed.is_empty());
        assert!(report.diff.changed.is_empty());
        assert!(report.diff.unchanged.is_empty());
        assert!(report.errors.is_empty());
        assert!(report.committed);
        assert_eq!(report.bytes_hashed, 10);
        assert_eq!(rec.store().load().unwrap().len(), 2);
    }

    #[test]
    fn test_second_run_detects_content_change() {
        let (temp_dir, mut rec) = setup();
        write_tree(&temp_dir, "a.txt", "hello");
        write_tree(&temp_dir, "b.txt", "world");
        let paths = vec!["a.txt".to_string(), "b.txt".to_string()];

        rec.run(&paths, &RunOptions::default(), None).unwrap();
        write_tree(&temp_dir, "b.txt", "world!");
        let report = rec.run(&paths, &RunOptions::default(), None).unwrap();

        assert!(report.diff.added.is_empty());
        assert!(report.diff.removed.is_empty());
        assert_eq!(report.diff.changed, vec!["b.txt"]);
        assert_eq!(report.diff.unchanged, vec!["a.txt"]);
    }

    #[test]
    fn test_idempotent_when_nothing_changes() {
        let (temp_dir, mut rec) = setup();
        write_tree(&temp_dir, "a.txt", "hello");
        write_tree(&temp_dir, "b.txt", "world");
        let paths = vec!["a.txt".to_string(), "b.txt".to_string()];

        rec.run(&paths, &RunOptions::default(), None).unwrap();
        let report = rec.run(&paths, &RunOptions::default(), None).unwrap();

        assert!(report.diff.is_clean());
        assert_eq!(report.diff.unchanged, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_deleted_file_reported_removed_and_kept_grow_only() {
        let (temp_dir, mut rec) = setup();
        write_tree(&temp_dir, "a.txt", "hello");
        write_tree(&temp_dir, "b.txt", "world");
        rec.run(
            &["a.txt".to_string(), "b.txt".to_string()],
            &RunOptions::default(),
            None,
        )
        .unwrap();

        // b.txt deleted from disk and no longer discovered
        fs::remove_file(temp_dir.path().join("tree").join("b.txt")).unwrap();
        let report = rec
            .run(&["a.txt".to_string()], &RunOptions::default(), None)
            .unwrap();

        assert_eq!(report.diff.removed, vec!["b.txt"]);
        // Grow-only default: the stale row survives the commit
        assert!(rec.store().load().unwrap().contains("b.txt"));
    }

    #[test]
    fn test_deleted_file_pruned_when_asked() {
        let (temp_dir, mut rec) = setup();
        write_tree(&temp_dir, "a.txt", "hello");
        write_tree(&temp_dir, "b.txt", "world");
        rec.run(
            &["a.txt".to_string(), "b.txt".to_string()],
            &RunOptions::default(),
            None,
        )
        .unwrap();

        fs::remove_file(temp_dir.path().join("tree").join("b.txt")).unwrap();
        let options = RunOptions {
            prune: true,
            ..RunOptions::default()
        };
        let report = rec.run(&["a.txt".to_string()], &options, None).unwrap();

        assert_eq!(report.diff.removed, vec!["b.txt"]);
        assert!(rec.store().load().unwrap().get("b.txt").is_none());
    }

    #[test]
    fn test_unreadable_file_keeps_prior_digest() {
        let (temp_dir, mut rec) = setup();
        write_tree(&temp_dir, "a.txt", "hello");
        write_tree(&temp_dir, "b.txt", "world");
        let paths = vec!["a.txt".to_string(), "b.txt".to_string()];
        rec.run(&paths, &RunOptions::default(), None).unwrap();

        // b.txt disappears between discovery and hashing; the stale path
        // list still names it
        fs::remove_file(temp_dir.path().join("tree").join("b.txt")).unwrap();
        let report = rec.run(&paths, &RunOptions::default(), None).unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "b.txt");
        // Prior digest retained: not a false "removed"
        assert!(report.diff.removed.is_empty());
        assert!(report.diff.unchanged.contains(&"b.txt".to_string()));
        assert_eq!(report.diff.unchanged, vec!["a.txt", "b.txt"]);
        // The retained file was never hashed, so only a.txt counts
        assert_eq!(report.bytes_hashed, 5);
    }

    #[test]
    fn test_unreadable_new_file_is_error_only() {
        let (temp_dir, mut rec) = setup();
        write_tree(&temp_dir, "a.txt", "hello");

        // never-seen path that cannot be read: reported, not snapshotted
        let paths = vec!["a.txt".to_string(), "ghost.txt".to_string()];
        let report = rec.run(&paths, &RunOptions::default(), None).unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "ghost.txt");
        assert_eq!(report.diff.added, vec!["a.txt"]);
        assert!(!rec.store().load().unwrap().contains("ghost.txt"));
    }

    #[test]
    fn test_dry_run_commits_nothing() {
        let (temp_dir, mut rec) = setup();
        write_tree(&temp_dir, "a.txt", "hello");

        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        let report = rec.run(&["a.txt".to_string()], &options, None).unwrap();

        assert!(!report.committed);
        assert_eq!(report.diff.added, vec!["a.txt"]);
        assert!(rec.store().load().unwrap().is_empty());
        assert!(rec.store().last_run().unwrap().is_none());
    }

    #[test]
    fn test_run_session_recorded() {
        let (temp_dir, mut rec) = setup();
        write_tree(&temp_dir, "a.txt", "hello");

        rec.run(&["a.txt".to_string()], &RunOptions::default(), None)
            .unwrap();

        let last = rec.store().last_run().unwrap().unwrap();
        assert_eq!(last.stats.added, 1);
        assert_eq!(last.stats.total_files, 1);
    }
}
