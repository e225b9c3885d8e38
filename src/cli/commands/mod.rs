//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `scan`: collection scans, listing, deletion and monitoring
//! - `init`: writing the configuration file

mod init;
mod scan;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db;

pub use init::cmd_init;
pub use scan::{cmd_delete, cmd_list, cmd_scan, cmd_watch};

/// Keep a SQLite music collection in sync with directories on disk
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: OS config directory)
    #[arg(long, global = true, env = "COLLECTION_SCANNER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file (overrides the configured path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Write a configuration file with the given collection roots
    Init {
        /// Collection root directories (paths or `file://` URIs)
        #[arg(required = true)]
        roots: Vec<String>,
        /// Do not follow symlinks while scanning
        #[arg(long)]
        ignore_symlinks: bool,
        /// Rescan changed directories while `watch` runs
        #[arg(long)]
        auto_update: bool,
    },
    /// Scan the configured collection roots (or the given URIs)
    Scan {
        /// Only scan these directories of the collection
        #[arg(long, num_args = 1.., conflicts_with = "external")]
        new_files: Vec<String>,
        /// Ingest files from outside the collection and hand them to playback
        #[arg(long, num_args = 1..)]
        external: Vec<String>,
    },
    /// List all tracks in the database
    List,
    /// Remove a track from the database
    Delete {
        /// `file://` URI or path of the track
        uri: String,
        /// Do not keep the track's stats in the history store
        #[arg(long)]
        no_backup: bool,
    },
    /// Scan the collection, then rescan directories as they change
    Watch,
}

/// Loaded configuration plus the database location to open.
pub struct Context {
    pub config: Config,
    /// Where the configuration was (or will be) stored
    pub config_path: Option<PathBuf>,
    pub db_url: String,
}

impl Context {
    fn from_cli(cli: &Cli) -> Self {
        let config_path = cli.config.clone().or_else(config::config_path);
        let config = match &config_path {
            Some(path) => config::load_from(path),
            None => config::load(),
        };
        let db_path = cli.db.clone().unwrap_or_else(|| config.db_path());
        Self {
            db_url: db::db_url(Some(&db_path)),
            config,
            config_path,
        }
    }

    pub async fn open_db(&self) -> anyhow::Result<sqlx::SqlitePool> {
        db::init_db(&self.db_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", self.db_url, e))
    }
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let ctx = Context::from_cli(cli);

    match &cli.command {
        Commands::Init {
            roots,
            ignore_symlinks,
            auto_update,
        } => cmd_init(&ctx, roots, *ignore_symlinks, *auto_update),
        Commands::Scan {
            new_files,
            external,
        } => cmd_scan(&rt, &ctx, new_files, external),
        Commands::List => cmd_list(&rt, &ctx),
        Commands::Delete { uri, no_backup } => cmd_delete(&rt, &ctx, uri, !*no_backup),
        Commands::Watch => cmd_watch(&rt, &ctx),
    }
}
