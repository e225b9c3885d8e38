//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\collection-scanner\config.toml
//! - macOS: ~/Library/Application Support/collection-scanner/config.toml
//! - Linux: ~/.config/collection-scanner/config.toml
//!
//! The config file is human-readable and editable. Settings are
//! loaded at startup; the scanner only reads them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection roots and scan policies
    pub collection: CollectionConfig,

    /// Database location
    pub database: DatabaseConfig,
}

/// Collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Collection roots (`file://` URIs or plain paths)
    pub uris: Vec<String>,

    /// Do not follow symlinked entries while walking
    pub ignore_symlinks: bool,

    /// Attribute albums with mixed artists to "Compilations"
    pub show_compilations: bool,

    /// Hand playlist files found in the collection to the importer
    pub import_playlists: bool,

    /// Watch collection roots and rescan changed directories
    pub auto_update: bool,

    /// Upper bound of the extraction worker pool (1 to [`MAX_WORKERS`])
    pub max_workers: usize,
}

/// Hard cap on extraction workers.
pub const MAX_WORKERS: usize = 5;

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            uris: Vec::new(),
            ignore_symlinks: false,
            show_compilations: true,
            import_playlists: true,
            auto_update: false,
            max_workers: MAX_WORKERS,
        }
    }
}

/// Database settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file (empty = default location in the data directory)
    pub path: Option<PathBuf>,
}

/// Runtime view of [`CollectionConfig`] handed to the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerSettings {
    pub music_uris: Vec<String>,
    pub ignore_symlinks: bool,
    pub show_compilations: bool,
    pub import_playlists: bool,
    pub max_workers: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        ScannerSettings::from(&CollectionConfig::default())
    }
}

impl From<&CollectionConfig> for ScannerSettings {
    fn from(config: &CollectionConfig) -> Self {
        Self {
            music_uris: config
                .uris
                .iter()
                .filter_map(|uri| match crate::uri::normalize(uri) {
                    Ok(uri) => Some(uri),
                    Err(e) => {
                        tracing::warn!(target: "config", uri = %uri, error = %e, "Ignoring collection root");
                        None
                    }
                })
                .collect(),
            ignore_symlinks: config.ignore_symlinks,
            show_compilations: config.show_compilations,
            import_playlists: config.import_playlists,
            max_workers: config.max_workers.clamp(1, MAX_WORKERS),
        }
    }
}

/// Normalize collection roots to `file://` URIs, rejecting roots that do not exist.
pub fn validate_roots(inputs: &[String]) -> crate::error::Result<Vec<String>> {
    inputs
        .iter()
        .map(|input| {
            let uri = crate::uri::normalize(input)?;
            if crate::uri::exists(&uri) {
                Ok(uri)
            } else {
                Err(crate::error::Error::config(format!(
                    "collection root does not exist: {input}"
                )))
            }
        })
        .collect()
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("collection-scanner"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Default database location
pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("collection-scanner").join("collection.db"))
}

impl Config {
    /// Database file to open: configured path, else the data directory default.
    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(default_db_path)
            .unwrap_or_else(|| PathBuf::from(crate::db::DEFAULT_DB_NAME))
    }
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from an explicit file
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
