//! Command-line interface for collection-scanner.
//!
//! Scans, lists, deletes and monitors the collection described by the
//! configuration file.

mod commands;

pub use commands::{Cli, Commands, run_command};
