use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::discovery;
use crate::output::{self, OutputMode};
use crate::progress;
use crate::reconciler::{Reconciler, RunOptions};
use crate::store::{FingerprintStore, StoreConfig, DEFAULT_DATABASE, DEFAULT_TABLE};

#[derive(Parser)]
#[command(name = "imprint")]
#[command(version)]
#[command(about = "Track file changes across runs using content checksums")]
#[command(long_about = "Imprint hashes every file under a directory tree, compares the digests \
    against the snapshot persisted by the previous run, and reports which files \
    were added, removed, changed, or left unchanged.\n\n\
    Examples:\n  \
    imprint run                     # Hash the current directory and commit\n  \
    imprint run --path src --prune  # Reconcile src/, dropping stale records\n  \
    imprint status --json           # Diff without committing, for scripting\n  \
    imprint reset -y                # Forget all recorded fingerprints")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase output verbosity (-v, -vv for more)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Hash the tree, diff against the last run, and commit the new snapshot
    #[command(visible_alias = "r")]
    Run {
        /// Root directory to fingerprint [default: current directory]
        #[arg(long, value_name = "DIR")]
        path: Option<PathBuf>,

        /// Database file holding the fingerprint store
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,

        /// Logical table name within the database
        #[arg(long, value_name = "NAME")]
        table: Option<String>,

        /// Delete records for files no longer present (default keeps them)
        #[arg(long)]
        prune: bool,

        /// Number of hashing workers [default: one per CPU core]
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,

        /// Output results as JSON for scripting
        #[arg(long)]
        json: bool,

        /// Config file [default: imprint.toml in the scanned root]
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Show the diff without committing anything
    #[command(visible_alias = "s")]
    Status {
        /// Root directory to fingerprint [default: current directory]
        #[arg(long, value_name = "DIR")]
        path: Option<PathBuf>,

        /// Database file holding the fingerprint store
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,

        /// Logical table name within the database
        #[arg(long, value_name = "NAME")]
        table: Option<String>,

        /// Number of hashing workers [default: one per CPU core]
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,

        /// Output results as JSON for scripting
        #[arg(long)]
        json: bool,

        /// Config file [default: imprint.toml in the scanned root]
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Forget all recorded fingerprints for a table
    Reset {
        /// Database file holding the fingerprint store
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,

        /// Logical table name within the database
        #[arg(long, value_name = "NAME")]
        table: Option<String>,

        /// Skip confirmation prompt
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn run(self) -> anyhow::Result<()> {
        let output_mode = if self.quiet {
            OutputMode::Quiet
        } else if self.verbose >= 2 {
            OutputMode::VeryVerbose
        } else if self.verbose == 1 {
            OutputMode::Verbose
        } else {
            OutputMode::Normal
        };

        match self.command {
            Commands::Run {
                path,
                db,
                table,
                prune,
                jobs,
                json,
                config,
            } => run_pipeline(
                path, db, table, jobs, json, config, output_mode,
                RunMode::Commit { prune },
            ),
            Commands::Status {
                path,
                db,
                table,
                jobs,
                json,
                config,
            } => run_pipeline(
                path, db, table, jobs, json, config, output_mode,
                RunMode::DryRun,
            ),
            Commands::Reset { db, table, yes } => reset(db, table, yes, output_mode),
        }
    }
}

enum RunMode {
    Commit { prune: bool },
    DryRun,
}

#[allow(clippy::too_many_arguments)]
fn run_pipeline(
    path: Option<PathBuf>,
    db: Option<PathBuf>,
    table: Option<String>,
    jobs: Option<usize>,
    json: bool,
    config_path: Option<PathBuf>,
    output_mode: OutputMode,
    mode: RunMode,
) -> anyhow::Result<()> {
    let root = path.unwrap_or_else(|| PathBuf::from("."));

    let config = match config_path {
        Some(explicit) => Config::load(&explicit)?,
        None => Config::load_from_root(&root)?,
    };

    let store_config = resolve_store_config(db, table, &config);
    let jobs = jobs.or(config.jobs);

    // A dry run against a tree with no database yet must not create one
    let store = if matches!(mode, RunMode::DryRun) && !store_config.database.exists() {
        FingerprintStore::open_in_memory(&store_config.table)?
    } else {
        FingerprintStore::open(&store_config).with_context(|| {
            format!("failed to open store at {}", store_config.database.display())
        })?
    };

    let spinner = if output_mode != OutputMode::Quiet && !json {
        Some(progress::create_spinner("Discovering files..."))
    } else {
        None
    };

    let mut files = discovery::discover(&root, |e| {
        if output_mode == OutputMode::Verbose || output_mode == OutputMode::VeryVerbose {
            eprintln!("{} skipping unreadable entry: {}", "Warning:".yellow(), e);
        }
    })
    .with_context(|| format!("failed to walk {}", root.display()))?;

    if let Some(sp) = &spinner {
        progress::finish_and_clear(sp);
    }

    // The database (and its transient SQLite sidecars) may live inside the
    // scanned tree; never fingerprint them
    let excluded: Vec<PathBuf> = store_artifacts(&store_config.database)
        .iter()
        .filter_map(|p| p.canonicalize().ok())
        .collect();
    if !excluded.is_empty() {
        files.retain(|rel| {
            root.join(rel)
                .canonicalize()
                .map(|p| !excluded.contains(&p))
                .unwrap_or(true)
        });
    }

    let mut reconciler = Reconciler::new(&root, store);

    let bar = if output_mode != OutputMode::Quiet && !json && !files.is_empty() {
        Some(progress::create_progress_bar(files.len() as u64, "hashing"))
    } else {
        None
    };

    let options = RunOptions {
        prune: matches!(mode, RunMode::Commit { prune: true }),
        jobs,
        dry_run: matches!(mode, RunMode::DryRun),
    };
    let report = reconciler.run(&files, &options, bar.as_ref())?;

    if let Some(bar) = bar {
        progress::finish_and_clear(&bar);
    }

    if json {
        output::print_json(&report)?;
    } else {
        if matches!(mode, RunMode::DryRun) && output_mode != OutputMode::Quiet {
            match reconciler.store().last_run()? {
                Some(last) => println!(
                    "Last committed run: {} ({} files)",
                    last.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    last.stats.total_files
                ),
                None => println!("No committed run yet."),
            }
        }
        output::print_human(&report, output_mode);
    }

    reconciler.finish()?;
    Ok(())
}

fn reset(
    db: Option<PathBuf>,
    table: Option<String>,
    yes: bool,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let store_config = resolve_store_config(db, table, &Config::default());

    let mut store = FingerprintStore::open(&store_config)
        .with_context(|| format!("failed to open store at {}", store_config.database.display()))?;

    let count = store.load()?.len();
    if count == 0 {
        if output_mode != OutputMode::Quiet {
            println!("Table {:?} is already empty.", store_config.table);
        }
        store.close()?;
        return Ok(());
    }

    if !yes {
        print!(
            "Forget {} recorded fingerprints in table {:?}? [y/N]: ",
            count, store_config.table
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", "Cancelled.".dimmed());
            store.close()?;
            return Ok(());
        }
    }

    let deleted = store.clear()?;
    if output_mode != OutputMode::Quiet {
        println!("{}", format!("Forgot {deleted} fingerprints.").green());
    }
    store.close()?;
    Ok(())
}

/// The database file plus the sidecar files SQLite may create next to it
fn store_artifacts(database: &Path) -> Vec<PathBuf> {
    let mut paths = vec![database.to_path_buf()];
    if let Some(name) = database.file_name().and_then(|n| n.to_str()) {
        for suffix in ["-journal", "-wal", "-shm"] {
            paths.push(database.with_file_name(format!("{name}{suffix}")));
        }
    }
    paths
}

fn resolve_store_config(
    db: Option<PathBuf>,
    table: Option<String>,
    config: &Config,
) -> StoreConfig {
    StoreConfig {
        database: db
            .or_else(|| config.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
        table: table
            .or_else(|| config.table.clone())
            .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "imprint", "run", "--path", "src", "--db", "state.db", "--table", "frontend",
            "--prune", "--jobs", "4", "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                path,
                db,
                table,
                prune,
                jobs,
                json,
                config,
            } => {
                assert_eq!(path, Some(PathBuf::from("src")));
                assert_eq!(db, Some(PathBuf::from("state.db")));
                assert_eq!(table.as_deref(), Some("frontend"));
                assert!(prune);
                assert_eq!(jobs, Some(4));
                assert!(json);
                assert!(config.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_aliases() {
        assert!(matches!(
            Cli::try_parse_from(["imprint", "r"]).unwrap().command,
            Commands::Run { .. }
        ));
        assert!(matches!(
            Cli::try_parse_from(["imprint", "s"]).unwrap().command,
            Commands::Status { .. }
        ));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["imprint", "run", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_store_artifacts_cover_sidecars() {
        let paths = store_artifacts(Path::new("work/state.db"));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("work/state.db"),
                PathBuf::from("work/state.db-journal"),
                PathBuf::from("work/state.db-wal"),
                PathBuf::from("work/state.db-shm"),
            ]
        );
    }

    #[test]
    fn test_status_does_not_create_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().join("tree");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.txt"), "hello").unwrap();
        let db = temp_dir.path().join("state.db");

        run_pipeline(
            Some(root),
            Some(db.clone()),
            None,
            None,
            false,
            None,
            OutputMode::Quiet,
            RunMode::DryRun,
        )
        .unwrap();

        assert!(!db.exists());
    }

    #[test]
    fn test_run_excludes_database_and_sidecars_from_tree() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().join("tree");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.txt"), "hello").unwrap();

        // Database inside the scanned tree, with a leftover sidecar file
        let db = root.join("state.db");
        std::fs::write(root.join("state.db-journal"), "junk").unwrap();

        run_pipeline(
            Some(root.clone()),
            Some(db.clone()),
            None,
            None,
            false,
            None,
            OutputMode::Quiet,
            RunMode::Commit { prune: false },
        )
        .unwrap();

        let store = FingerprintStore::open(&StoreConfig {
            database: db,
            table: DEFAULT_TABLE.to_string(),
        })
        .unwrap();
        let recorded: Vec<String> = store
            .load()
            .unwrap()
            .paths()
            .map(str::to_string)
            .collect();
        assert_eq!(recorded, vec!["a.txt"]);
    }

    #[test]
    fn test_resolve_store_config_precedence() {
        let config = Config {
            database: Some(PathBuf::from("from-config.db")),
            table: Some("from_config".to_string()),
            jobs: None,
        };

        // CLI flags win
        let resolved = resolve_store_config(
            Some(PathBuf::from("from-cli.db")),
            Some("from_cli".to_string()),
            &config,
        );
        assert_eq!(resolved.database, PathBuf::from("from-cli.db"));
        assert_eq!(resolved.table, "from_cli");

        // Config fills gaps
        let resolved = resolve_store_config(None, None, &config);
        assert_eq!(resolved.database, PathBuf::from("from-config.db"));
        assert_eq!(resolved.table, "from_config");

        // Defaults last
        let resolved = resolve_store_config(None, None, &Config::default());
        assert_eq!(resolved.database, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(resolved.table, DEFAULT_TABLE);
    }
}
