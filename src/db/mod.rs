//! Collection database: artists, albums, genres and tracks.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. Every query
//! function takes a `&mut SqliteConnection` so it can run on a pooled
//! connection or inside the scanner's per-album transaction alike.
//!
//! # Example
//!
//! ```ignore
//! use collection_scanner::db::{init_db, tracks};
//!
//! let pool = init_db("sqlite:collection.db").await?;
//! let mut conn = pool.acquire().await?;
//! let uris = tracks::get_uris(&mut conn, StorageType::COLLECTION).await?;
//! ```

pub mod albums;
pub mod artists;
pub mod genres;
pub mod tracks;

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{Error, Result, ResultExt};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "collection.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file (and its parent directory) if it doesn't exist,
/// establishes a connection pool with up to 5 connections, and runs all
/// pending migrations.
///
/// # Arguments
///
/// * `db_url` - SQLite connection URL (e.g., "sqlite:collection.db")
///
/// # Errors
///
/// Returns an error if:
/// - The database directory or file cannot be created
/// - Connection cannot be established
/// - Migration fails ([`Error::Migrate`])
pub async fn init_db(db_url: &str) -> Result<SqlitePool> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        if let Some(dir) = db_url
            .strip_prefix("sqlite:")
            .map(std::path::Path::new)
            .and_then(|p| p.parent())
            .filter(|d| !d.as_os_str().is_empty())
        {
            std::fs::create_dir_all(dir)
                .with_context(format!("Cannot create database directory {}", dir.display()))?;
        }
        sqlx::Sqlite::create_database(db_url)
            .await
            .with_context(format!("Cannot create database {db_url}"))?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .with_context(format!("Cannot connect to {db_url}"))?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(Error::Migrate)?;

    tracing::debug!(target: "db", url = %db_url, "Database ready");
    Ok(pool)
}
