//! Scanner-wide error types.
//!
//! Library modules return [`Error`] via `thiserror`, while the CLI and
//! `main` use `anyhow` for convenient error propagation.
//!
//! # Taxonomy
//!
//! - [`Error::MissingRoot`]: a requested root does not exist, aborts a job
//!   before any mutation
//! - [`Error::Metadata`]: tag or duration reading failed for one file
//! - [`Error::Database`]: a single storage operation failed
//! - [`Error::Cancelled`]: the job is no longer wanted, never user-facing
//!
//! Only `MissingRoot` and `Cancelled` abort a scan; every per-file error is
//! logged and the file skipped.
//!
//! # Example
//!
//! ```ignore
//! use collection_scanner::error::{Error, Result};
//!
//! fn process_file(path: &Path) -> Result<()> {
//!     let tags = extractor.extract(path)?; // Metadata errors
//!     db::tracks::remove(conn, id).await?;  // Database errors auto-convert
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

/// Scanner result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level scanner error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Metadata reading error
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// A collection root does not exist
    #[error("Missing collection root: {0}")]
    MissingRoot(String),

    /// The running job was cancelled
    #[error("Scan cancelled")]
    Cancelled,

    /// No track known for this URI
    #[error("Not found: {0}")]
    NotFound(String),

    /// URI could not be parsed or is not a local file
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(uri: impl Into<String>) -> Self {
        Self::NotFound(uri.into())
    }

    /// Create an invalid URI error.
    pub fn invalid_uri(uri: impl Into<String>) -> Self {
        Self::InvalidUri(uri.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// True if this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// True if this error (or the error it wraps) is a missing track.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}
