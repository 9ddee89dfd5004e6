//! Optional TOML configuration
//!
//! An `imprint.toml` next to the scanned root (or given via `--config`)
//! supplies defaults for the database path, table name, and worker count.
//! Command-line flags always win.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name probed in the scan root when no `--config` is given
pub const CONFIG_FILE_NAME: &str = "imprint.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Database file path; relative paths resolve against the config file's
    /// directory
    pub database: Option<PathBuf>,
    /// Fingerprint table name
    pub table: Option<String>,
    /// Hashing worker count
    pub jobs: Option<usize>,
}

impl Config {
    /// Load a config file, or an empty config if `path` does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        if let (Some(database), Some(dir)) = (&config.database, path.parent()) {
            if database.is_relative() {
                config.database = Some(dir.join(database));
            }
        }

        Ok(config)
    }

    /// Load the conventional config file from the scan root, if present.
    pub fn load_from_root(root: &Path) -> Result<Self> {
        Self::load(&root.join(CONFIG_FILE_NAME))
    }
}
