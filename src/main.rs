//! Collection Scanner - keeps a SQLite music collection in sync with disk.
//!
//! Walks the configured collection roots, reads audio tags and reconciles
//! artists, albums, genres and tracks, preserving play statistics across
//! deletions and moves.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod metadata;
pub mod model;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;
pub mod uri;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging; subsystems log under their own targets (scanner::*, db)
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("collection_scanner=info".parse()?)
                .add_directive("scanner=info".parse()?),
        )
        .init();

    cli::run_command(&args)
}
