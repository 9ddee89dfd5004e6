//! Error taxonomy for the fingerprint store and reconciler
//!
//! Per-file read failures are recoverable and collected into the run report;
//! store-level failures abort the run.

use std::path::PathBuf;
use thiserror::Error;

/// A single file could not be read for hashing.
///
/// The run continues: the path is reported and, when a prior digest exists,
/// that digest is retained so the file does not show up as removed.
#[derive(Debug, Error)]
#[error("failed to read {path}: {source}")]
pub struct FileReadError {
    /// Relative path of the file that failed to hash
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

impl FileReadError {
    pub fn new(path: impl Into<String>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Fatal store-level failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened or created
    #[error("store unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A commit failed; the transaction was rolled back and the prior
    /// persisted state is intact
    #[error("failed to commit snapshot: {0}")]
    WriteFailed(#[source] rusqlite::Error),

    /// Table names are embedded as identifiers and must match
    /// `[A-Za-z_][A-Za-z0-9_]*`
    #[error("invalid table name {0:?}: must start with a letter or underscore and contain only letters, digits, and underscores")]
    InvalidTable(String),

    /// Any other query failure (load, session bookkeeping)
    #[error("store query failed: {0}")]
    Query(#[from] rusqlite::Error),
}
