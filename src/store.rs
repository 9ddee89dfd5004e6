//! SQLite-backed fingerprint store
//!
//! Persists the most recently committed snapshot as a `file` → `checksum`
//! table, plus a `runs` table recording one row per reconciler run. A commit
//! is a single transaction: either every pair lands or none do, and a failed
//! commit leaves the prior state untouched.
//!
//! The store is single-writer: one reconciler holds it open for the duration
//! of a run, and no cross-process locking is layered on top of SQLite's own.

use crate::error::StoreError;
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::PathBuf;

/// Default database file name
pub const DEFAULT_DATABASE: &str = "fingerprints.db";

/// Default logical table name, matching the store's historical default
pub const DEFAULT_TABLE: &str = "default_table";

/// Where the store lives and which logical table it serves
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub database: PathBuf,
    /// Fingerprint table name within that file
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

/// Counts recorded for one completed run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStats {
    pub total_files: usize,
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub read_errors: usize,
}

/// One row of the `runs` table
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: RunStats,
}

/// Persistent path → digest table
pub struct FingerprintStore {
    conn: Connection,
    table: String,
}

impl FingerprintStore {
    /// Open or create the store.
    ///
    /// Creates the fingerprint and runs tables if they do not exist. The
    /// table name is validated before being embedded as an identifier; all
    /// row values go through bound parameters.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        validate_table_name(&config.table)?;

        let conn = Connection::open(&config.database).map_err(|e| StoreError::Unavailable {
            path: config.database.clone(),
            source: e,
        })?;

        let store = Self {
            conn,
            table: config.table.clone(),
        };
        store.init_schema().map_err(|e| match e {
            StoreError::Query(source) => StoreError::Unavailable {
                path: config.database.clone(),
                source,
            },
            other => other,
        })?;

        Ok(store)
    }

    /// Open a throwaway in-memory store.
    ///
    /// Used for dry runs against a tree that has no database yet, so a
    /// status check never creates the database file as a side effect.
    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;

        let conn = Connection::open_in_memory().map_err(|e| StoreError::Unavailable {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;

        let store = Self {
            conn,
            table: table.to_string(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (
                    file TEXT PRIMARY KEY,
                    checksum TEXT NOT NULL
                )",
                self.table
            ),
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                finished_at INTEGER,
                total_files INTEGER,
                added INTEGER,
                removed INTEGER,
                changed INTEGER,
                unchanged INTEGER,
                read_errors INTEGER
            )",
            [],
        )?;

        Ok(())
    }

    /// Load the full prior mapping. Empty for a freshly created table.
    pub fn load(&self) -> Result<Snapshot, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT file, checksum FROM \"{}\"", self.table))?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshot = Snapshot::new();
        for row in rows {
            let (file, checksum) = row?;
            snapshot.insert(file, checksum);
        }

        Ok(snapshot)
    }

    /// Upsert every record from `snapshot` in a single transaction.
    ///
    /// With `prune` set, rows whose path is absent from the snapshot are
    /// deleted in the same transaction; otherwise the table is grow-only and
    /// stale rows survive (the historical behavior). Returns `WriteFailed`
    /// on any underlying failure, after rollback.
    pub fn commit(&mut self, snapshot: &Snapshot, prune: bool) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(StoreError::WriteFailed)?;

        {
            let mut upsert = tx
                .prepare(&format!(
                    "INSERT INTO \"{}\" (file, checksum) VALUES (?1, ?2)
                     ON CONFLICT(file) DO UPDATE SET checksum = ?2",
                    self.table
                ))
                .map_err(StoreError::WriteFailed)?;

            for (path, digest) in snapshot.iter() {
                upsert
                    .execute(params![path, digest])
                    .map_err(StoreError::WriteFailed)?;
            }
        }

        if prune {
            let stale: Vec<String> = {
                let mut stmt = tx
                    .prepare(&format!("SELECT file FROM \"{}\"", self.table))
                    .map_err(StoreError::WriteFailed)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(StoreError::WriteFailed)?;

                let mut stale = Vec::new();
                for row in rows {
                    let file = row.map_err(StoreError::WriteFailed)?;
                    if !snapshot.contains(&file) {
                        stale.push(file);
                    }
                }
                stale
            };

            let mut delete = tx
                .prepare(&format!("DELETE FROM \"{}\" WHERE file = ?1", self.table))
                .map_err(StoreError::WriteFailed)?;
            for file in &stale {
                delete.execute([file]).map_err(StoreError::WriteFailed)?;
            }
            drop(delete);
        }

        tx.commit().map_err(StoreError::WriteFailed)
    }

    /// Delete every fingerprint row, keeping run history
    pub fn clear(&mut self) -> Result<usize, StoreError> {
        let deleted = self
            .conn
            .execute(&format!("DELETE FROM \"{}\"", self.table), [])?;
        Ok(deleted)
    }

    /// Record the start of a run; returns the run id
    pub fn begin_run(&mut self) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO runs (table_name, started_at) VALUES (?1, ?2)",
            params![self.table, Utc::now().timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Record the completion of a run
    pub fn finish_run(&mut self, run_id: i64, stats: &RunStats) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE runs SET
                finished_at = ?1,
                total_files = ?2,
                added = ?3,
                removed = ?4,
                changed = ?5,
                unchanged = ?6,
                read_errors = ?7
             WHERE id = ?8",
            params![
                Utc::now().timestamp(),
                stats.total_files as i64,
                stats.added as i64,
                stats.removed as i64,
                stats.changed as i64,
                stats.unchanged as i64,
                stats.read_errors as i64,
                run_id
            ],
        )?;
        Ok(())
    }

    /// Most recent completed run for this table, if any
    pub fn last_run(&self) -> Result<Option<RunRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at,
                        total_files, added, removed, changed, unchanged, read_errors
                 FROM runs
                 WHERE table_name = ?1 AND finished_at IS NOT NULL
                 ORDER BY id DESC LIMIT 1",
                [&self.table],
                |row| {
                    let started_at: i64 = row.get(1)?;
                    let finished_at: Option<i64> = row.get(2)?;
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: DateTime::from_timestamp(started_at, 0)
                            .unwrap_or_else(Utc::now),
                        finished_at: finished_at
                            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                        stats: RunStats {
                            total_files: row.get::<_, i64>(3)? as usize,
                            added: row.get::<_, i64>(4)? as usize,
                            removed: row.get::<_, i64>(5)? as usize,
                            changed: row.get::<_, i64>(6)? as usize,
                            unchanged: row.get::<_, i64>(7)? as usize,
                            read_errors: row.get::<_, i64>(8)? as usize,
                        },
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    /// Release the connection, surfacing close errors.
    ///
    /// Dropping the store also releases it; this exists for callers that
    /// want the error instead of a silent drop.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Query(e))
    }
}

/// Table names are embedded as quoted identifiers, so only plain
/// identifier characters are accepted.
fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}
