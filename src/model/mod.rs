//! Core data models for the collection.
//!
//! Defines the persisted entities [`Track`], [`Album`], [`Artist`] and
//! [`Genre`] (mapped with SQLx), the [`StorageType`] classification and the
//! scan vocabulary ([`ScanType`], [`ScanUpdate`]).
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `artists` - Artist records, looked up by name
//! - `genres` - Genre records, looked up by name
//! - `albums` - Albums identified by their content hash (`lp_album_id`)
//! - `tracks` - Individual audio files, unique by URI
//! - `album_artists`, `album_genres`, `track_artists`, `track_genres` - links

mod ids;

pub use ids::{lp_album_id_of, lp_track_id_of};

use bitflags::bitflags;
use sqlx::FromRow;

/// Reserved artist attributed to albums with heterogeneous artists.
pub const COMPILATIONS_ARTIST_ID: i64 = -2001;

/// Placeholder used when no artist or album can be derived from tags.
pub const UNKNOWN: &str = "Unknown";

bitflags! {
    /// Where a track or album comes from; drives cleanup and persistence policy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StorageType: u32 {
        const NONE = 1 << 0;
        /// On-disk collection under a configured root
        const COLLECTION = 1 << 1;
        const EPHEMERAL = 1 << 2;
        const SAVED = 1 << 3;
        const SPOTIFY_NEW_RELEASES = 1 << 4;
        const SPOTIFY_SIMILARS = 1 << 5;
        /// Ingested ad hoc (drag and drop, web import)
        const EXTERNAL = 1 << 6;
    }
}

impl StorageType {
    /// Decode the integer column, dropping unknown bits.
    pub fn from_db(value: i64) -> Self {
        Self::from_bits_truncate(value as u32)
    }

    /// Encode for the integer column.
    pub fn to_db(self) -> i64 {
        i64::from(self.bits())
    }
}

/// Kind of scan requested from the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanType {
    /// Re-derive the URI set from the configured collection roots
    Full,
    /// Scan a caller-supplied subset of the collection
    NewFiles,
    /// One-off ingestion of arbitrary URIs outside the collection roots
    External,
}

impl ScanType {
    pub fn storage_type(self) -> StorageType {
        match self {
            ScanType::External => StorageType::EXTERNAL,
            ScanType::Full | ScanType::NewFiles => StorageType::COLLECTION,
        }
    }
}

/// Kind of change reported for a [`crate::scanner::CollectionItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanUpdate {
    Added,
    Modified,
    Removed,
}

/// An artist in the collection.
#[derive(Debug, Clone, FromRow)]
pub struct Artist {
    /// Database ID (auto-generated, negative ids are reserved)
    pub id: i64,
    pub name: String,
    pub sortname: String,
    pub mb_artist_id: String,
    /// Appears on tracks but on no album
    pub featuring: bool,
}

/// A genre in the collection.
#[derive(Debug, Clone, FromRow)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// An album in the collection.
#[derive(Debug, Clone, FromRow)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub mb_album_id: String,
    /// Content hash of name, album artists and year
    pub lp_album_id: String,
    /// Directory of the first ingested track
    pub uri: String,
    pub loved: i64,
    pub popularity: i64,
    pub rate: i64,
    pub synced: i64,
    pub mtime: i64,
    pub year: Option<i64>,
    pub timestamp: Option<i64>,
    pub storage_type: i64,
}

/// A track (audio file) in the collection.
#[derive(Debug, Clone, FromRow)]
pub struct Track {
    pub id: i64,
    pub name: String,
    /// `file://` URI (unique identifier)
    pub uri: String,
    /// Duration in milliseconds
    pub duration: i64,
    pub tracknumber: i64,
    pub discnumber: i64,
    pub discname: String,
    pub album_id: i64,
    pub year: Option<i64>,
    pub timestamp: Option<i64>,
    pub popularity: i64,
    pub rate: i64,
    pub loved: i64,
    /// Last listened time (unix seconds)
    pub ltime: i64,
    /// Modification time recorded at ingestion (unix seconds)
    pub mtime: i64,
    pub mb_track_id: String,
    /// Content hash of name, artists, year and album name
    pub lp_track_id: String,
    pub bpm: f64,
    pub storage_type: i64,
}
